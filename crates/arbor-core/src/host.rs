//! The boundary to the live mutable structure the reconciler commits into.
//!
//! The differ only ever drives these primitives; it never allocates host
//! nodes outside [`Host::create_element`]/[`Host::create_text`] and never
//! navigates beyond the read-only accessors used for placement checks and
//! hydration adoption.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle into the host structure.
pub type HostId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    Missing { id: HostId },
    KindMismatch { id: HostId, expected: &'static str },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} missing"),
            HostError::KindMismatch { id, expected } => {
                write!(f, "host node {id} kind mismatch; expected {expected}")
            }
        }
    }
}

impl std::error::Error for HostError {}

/// Read-only description of a host node, used by hydration's shape check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNode {
    Element { tag: Rc<str> },
    Text { text: Rc<str> },
}

/// An event delivered to a bound handler.
pub struct Event {
    name: Rc<str>,
    detail: Option<Rc<dyn Any>>,
}

impl Event {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }

    pub fn with_detail<T: 'static>(name: &str, detail: T) -> Self {
        Self {
            name: name.into(),
            detail: Some(Rc::new(detail)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detail<T: 'static>(&self) -> Option<&T> {
        self.detail.as_deref().and_then(|d| d.downcast_ref())
    }
}

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// A bound event callback. Clones share identity; the patcher compares
/// handlers by pointer so a re-created closure re-binds.
#[derive(Clone)]
pub struct EventHandler {
    id: u64,
    func: Rc<dyn Fn(&Event)>,
}

impl EventHandler {
    pub fn new(f: impl Fn(&Event) + 'static) -> Self {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            func: Rc::new(f),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn invoke(&self, event: &Event) {
        (self.func)(event);
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler#{}", self.id)
    }
}

/// Mutation primitives plus the navigation the reconciler needs. All
/// mutating calls are expected to be cheap; the differ already minimizes
/// how many it issues.
pub trait Host {
    fn create_element(&mut self, tag: &str) -> HostId;
    fn create_text(&mut self, text: &str) -> HostId;
    fn set_text(&mut self, id: HostId, text: &str) -> Result<(), HostError>;
    fn set_attribute(&mut self, id: HostId, name: &str, value: &str) -> Result<(), HostError>;
    fn remove_attribute(&mut self, id: HostId, name: &str) -> Result<(), HostError>;
    fn set_style(&mut self, id: HostId, prop: &str, value: &str) -> Result<(), HostError>;
    fn remove_style(&mut self, id: HostId, prop: &str) -> Result<(), HostError>;
    fn set_listener(
        &mut self,
        id: HostId,
        event: &str,
        handler: Option<EventHandler>,
    ) -> Result<(), HostError>;

    /// The single insert/move primitive: places `child` directly after
    /// `prev` under `parent`; `prev = None` means the front of `parent`.
    fn insert_after(
        &mut self,
        parent: HostId,
        child: HostId,
        prev: Option<HostId>,
    ) -> Result<(), HostError>;
    fn detach(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;
    /// Frees a detached subtree.
    fn release(&mut self, id: HostId) -> Result<(), HostError>;

    fn parent_of(&self, id: HostId) -> Option<HostId>;
    fn prev_sibling(&self, id: HostId) -> Option<HostId>;
    fn first_child(&self, id: HostId) -> Option<HostId>;
    fn next_sibling(&self, id: HostId) -> Option<HostId>;
    fn describe(&self, id: HostId) -> Result<HostNode, HostError>;
    fn attribute_names(&self, id: HostId) -> Vec<Rc<str>>;
    fn listener(&self, id: HostId, event: &str) -> Option<EventHandler>;
}
