//! The component capability set and instance state.
//!
//! Components are modeled as an interface with optional capability
//! methods rather than inheritance: a plain function component is the
//! interface with only `render` populated. The differ never distinguishes
//! the two shapes.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::ContextKey;
use crate::hooks::HookList;
use crate::host::HostError;
use crate::node::{Props, VNode};
use crate::scheduler::UpdateHandle;

/// Failure raised while rendering or committing a tree position.
///
/// Recovered by the nearest ancestor with error-capture capability;
/// otherwise propagated out of the entry call that started the pass.
#[derive(Clone, Debug)]
pub enum RenderError {
    /// Raised synchronously by a component's render (or a hook inside it).
    Render { component: Rc<str>, message: Rc<str> },
    /// Raised by an effect callback after its pass already committed.
    Effect { component: Rc<str>, message: Rc<str> },
    Host(HostError),
}

impl RenderError {
    /// An error raised from inside a render function. The runtime fills
    /// in the component name as it unwinds.
    pub fn render(message: impl Into<Rc<str>>) -> Self {
        RenderError::Render {
            component: Rc::from(""),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RenderError::Render { message, .. } | RenderError::Effect { message, .. } => message,
            RenderError::Host(_) => "host mutation failed",
        }
    }

    pub fn component(&self) -> Option<&str> {
        match self {
            RenderError::Render { component, .. } | RenderError::Effect { component, .. } => {
                (!component.is_empty()).then_some(&**component)
            }
            RenderError::Host(_) => None,
        }
    }

    pub(crate) fn tag_component(self, name: &Rc<str>) -> Self {
        match self {
            RenderError::Render { component, message } if component.is_empty() => {
                RenderError::Render {
                    component: Rc::clone(name),
                    message,
                }
            }
            other => other,
        }
    }

    pub(crate) fn into_effect(self, name: &Rc<str>) -> Self {
        match self {
            RenderError::Render { message, .. } | RenderError::Effect { message, .. } => {
                RenderError::Effect {
                    component: Rc::clone(name),
                    message,
                }
            }
            host => host,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Render { component, message } if !component.is_empty() => {
                write!(f, "render of <{component}/> failed: {message}")
            }
            RenderError::Render { message, .. } => write!(f, "render failed: {message}"),
            RenderError::Effect { component, message } => {
                write!(f, "effect in <{component}/> failed: {message}")
            }
            RenderError::Host(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        RenderError::Host(err)
    }
}

/// The capability set. Everything except `render` defaults to a no-op, so
/// an implementation opts into exactly the lifecycle surface it needs.
///
/// `render` must be callable any number of times with the same props and
/// state (given identical hook-slot replay) and produce structurally
/// equivalent output; violating that is an implementer error, not
/// something the runtime enforces.
pub trait Component: Any {
    fn render(&mut self, props: &Props, children: &[VNode]) -> Result<VNode, RenderError>;

    /// Called once, before the first render, with the initial props and
    /// the handle the instance can later use to request its own update.
    fn initialize(&mut self, props: &Props, updater: UpdateHandle) {
        let _ = (props, updater);
    }

    /// Post-commit notification after the instance first appears.
    fn mounted(&mut self) {}

    /// Post-commit notification after a re-render of this instance.
    fn updated(&mut self) {}

    /// Fires before the instance's output handle is detached.
    fn before_unmount(&mut self) {}

    /// Pre-update guard: returning false skips the re-render for this
    /// subtree. Purely an optimization hook; state-driven updates bypass
    /// it.
    fn should_update(&self, old_props: &Props, new_props: &Props) -> bool {
        let _ = (old_props, new_props);
        true
    }

    /// Error-capture capability. Returning true claims the error: the
    /// instance is immediately re-rendered and its output re-diffed as
    /// the fallback for the failing subtree.
    fn catch(&mut self, error: &RenderError) -> bool {
        let _ = error;
        false
    }

    /// Context-provider capability: the key this instance provides for.
    fn provided_key(&self) -> Option<ContextKey> {
        None
    }

    /// Context-provider capability: the currently provided value.
    fn provided_value(&self) -> Option<Rc<dyn Any>> {
        None
    }

    /// Context-provider capability: registers a reader for invalidation.
    fn subscribe(&mut self, subscriber: UpdateHandle) {
        let _ = subscriber;
    }
}

type FactoryFn = Box<dyn Fn() -> Box<dyn Component>>;
type FunctionFn = dyn Fn(&Props, &[VNode]) -> Result<VNode, RenderError>;

struct SpecInner {
    name: Rc<str>,
    make: FactoryFn,
}

/// A reference to a component definition, with pointer identity.
///
/// Two nodes are compatible only when they carry clones of the *same*
/// spec; construct a spec once per definition and reuse it, otherwise
/// every pass remounts the subtree.
#[derive(Clone)]
pub struct ComponentSpec {
    inner: Rc<SpecInner>,
}

impl ComponentSpec {
    /// A stateful component: `make` builds a fresh instance per mount.
    pub fn stateful(name: &str, make: impl Fn() -> Box<dyn Component> + 'static) -> Self {
        Self {
            inner: Rc::new(SpecInner {
                name: name.into(),
                make: Box::new(make),
            }),
        }
    }

    /// A function component: a pure render function over props and
    /// children, with hooks for local state.
    pub fn function(
        name: &str,
        render: impl Fn(&Props, &[VNode]) -> Result<VNode, RenderError> + 'static,
    ) -> Self {
        let func: Rc<FunctionFn> = Rc::new(render);
        Self::stateful(name, move || {
            Box::new(FnComponent {
                func: Rc::clone(&func),
            })
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identity comparison; the differ's compatibility check.
    pub fn is(&self, other: &ComponentSpec) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Component> {
        (self.inner.make)()
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        Rc::clone(&self.inner.name)
    }
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentSpec({})", self.inner.name)
    }
}

struct FnComponent {
    func: Rc<FunctionFn>,
}

impl Component for FnComponent {
    fn render(&mut self, props: &Props, children: &[VNode]) -> Result<VNode, RenderError> {
        (self.func)(props, children)
    }
}

static NEXT_INSTANCE_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) fn next_instance_id() -> usize {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Live state for one mounted component position.
pub(crate) struct ComponentInstance {
    pub id: usize,
    pub name: Rc<str>,
    pub component: Box<dyn Component>,
    pub hooks: Rc<RefCell<HookList>>,
    pub updater: UpdateHandle,
}

impl ComponentInstance {
    pub fn new(spec: &ComponentSpec, updater: UpdateHandle) -> Self {
        Self {
            id: updater.instance,
            name: spec.name_rc(),
            component: spec.instantiate(),
            hooks: Rc::new(RefCell::new(HookList::new())),
            updater,
        }
    }

    /// Offers `error` to this instance: first to the component's own
    /// `catch` capability, then to an error-trap hook slot if one was
    /// declared during its last render.
    pub fn try_catch(&mut self, error: &RenderError) -> bool {
        if self.component.catch(error) {
            return true;
        }
        let trap = self.hooks.borrow().error_trap();
        match trap {
            Some(cell) => {
                *cell.borrow_mut() = Some(error.clone());
                true
            }
            None => false,
        }
    }
}
