//! Process-wide lifecycle interception points.
//!
//! External collaborators (devtools bridges, compatibility shims, debug
//! assertions) register callbacks against a fixed set of named slots;
//! each fires synchronously at the corresponding point. Registrants chain
//! in installation order, and the initial state of every slot is a no-op.

use std::cell::RefCell;
use std::rc::Rc;

use crate::node::{Kind, VNode};

type NodeCallback = Rc<dyn Fn(&VNode)>;
type UnmountCallback = Rc<dyn Fn(&Kind)>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    node_created: Vec<(u64, NodeCallback)>,
    before_diff: Vec<(u64, NodeCallback)>,
    after_commit: Vec<(u64, NodeCallback)>,
    before_unmount: Vec<(u64, UnmountCallback)>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Point {
    NodeCreated,
    BeforeDiff,
    AfterCommit,
    BeforeUnmount,
}

/// Keeps an installed callback alive. Dropping it (or calling
/// [`InterceptRegistration::uninstall`]) removes the callback from its
/// slot.
#[must_use = "dropping the registration uninstalls the callback"]
pub struct InterceptRegistration {
    point: Point,
    id: u64,
}

impl InterceptRegistration {
    pub fn uninstall(self) {
        drop(self);
    }
}

impl Drop for InterceptRegistration {
    fn drop(&mut self) {
        let (point, id) = (self.point, self.id);
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            match point {
                Point::NodeCreated => registry.node_created.retain(|(i, _)| *i != id),
                Point::BeforeDiff => registry.before_diff.retain(|(i, _)| *i != id),
                Point::AfterCommit => registry.after_commit.retain(|(i, _)| *i != id),
                Point::BeforeUnmount => registry.before_unmount.retain(|(i, _)| *i != id),
            }
        });
    }
}

fn next_id() -> u64 {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        registry.next_id += 1;
        registry.next_id
    })
}

/// Fires whenever [`crate::node::create_node`] constructs a node.
pub fn on_node_created(callback: impl Fn(&VNode) + 'static) -> InterceptRegistration {
    let id = next_id();
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .node_created
            .push((id, Rc::new(callback)));
    });
    InterceptRegistration {
        point: Point::NodeCreated,
        id,
    }
}

/// Fires before each tree position is diffed.
pub fn on_before_diff(callback: impl Fn(&VNode) + 'static) -> InterceptRegistration {
    let id = next_id();
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .before_diff
            .push((id, Rc::new(callback)));
    });
    InterceptRegistration {
        point: Point::BeforeDiff,
        id,
    }
}

/// Fires after a commit pass, with the description that was committed.
pub fn on_after_commit(callback: impl Fn(&VNode) + 'static) -> InterceptRegistration {
    let id = next_id();
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .after_commit
            .push((id, Rc::new(callback)));
    });
    InterceptRegistration {
        point: Point::AfterCommit,
        id,
    }
}

/// Fires before a render-tree position is torn down.
pub fn on_before_unmount(callback: impl Fn(&Kind) + 'static) -> InterceptRegistration {
    let id = next_id();
    REGISTRY.with(|registry| {
        registry
            .borrow_mut()
            .before_unmount
            .push((id, Rc::new(callback)));
    });
    InterceptRegistration {
        point: Point::BeforeUnmount,
        id,
    }
}

// The fire paths clone the callback list before invoking so a callback
// may itself construct nodes or install registrations re-entrantly.

pub(crate) fn fire_node_created(node: &VNode) {
    let callbacks: Vec<NodeCallback> = REGISTRY.with(|registry| {
        registry
            .borrow()
            .node_created
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect()
    });
    for callback in callbacks {
        callback(node);
    }
}

pub(crate) fn fire_before_diff(node: &VNode) {
    let callbacks: Vec<NodeCallback> = REGISTRY.with(|registry| {
        registry
            .borrow()
            .before_diff
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect()
    });
    for callback in callbacks {
        callback(node);
    }
}

pub(crate) fn fire_after_commit(node: &VNode) {
    let callbacks: Vec<NodeCallback> = REGISTRY.with(|registry| {
        registry
            .borrow()
            .after_commit
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect()
    });
    for callback in callbacks {
        callback(node);
    }
}

pub(crate) fn fire_before_unmount(kind: &Kind) {
    let callbacks: Vec<UnmountCallback> = REGISTRY.with(|registry| {
        registry
            .borrow()
            .before_unmount
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect()
    });
    for callback in callbacks {
        callback(kind);
    }
}

pub(crate) fn after_commit_active() -> bool {
    REGISTRY.with(|registry| !registry.borrow().after_commit.is_empty())
}

pub(crate) fn before_unmount_active() -> bool {
    REGISTRY.with(|registry| !registry.borrow().before_unmount.is_empty())
}
