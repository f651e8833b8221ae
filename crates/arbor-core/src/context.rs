//! Tree-scoped values with subscription.
//!
//! A [`Context`] owns a process-unique key and a default-value provider.
//! `provider` builds a component node that carries the value; readers use
//! [`crate::use_context`], which walks the render-tree ancestry for the
//! nearest provider and subscribes the reading instance to its changes.

use std::any::Any;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::component::{Component, ComponentSpec, RenderError};
use crate::hooks::ScopeCtx;
use crate::node::{component, fragment, ChildSpec, Props, PropValue, VNode};
use crate::scheduler::UpdateHandle;

pub type ContextKey = u64;

static NEXT_CONTEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// A context definition. Clones share identity; create one per logical
/// value and reuse it everywhere, the same way component specs are
/// reused.
pub struct Context<T> {
    key: ContextKey,
    default: Rc<dyn Fn() -> T>,
    spec: ComponentSpec,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            default: Rc::clone(&self.default),
            spec: self.spec.clone(),
        }
    }
}

impl<T: Clone + 'static> Context<T> {
    pub fn new(default: impl Fn() -> T + 'static) -> Self {
        let key = NEXT_CONTEXT_KEY.fetch_add(1, Ordering::Relaxed);
        let spec = ComponentSpec::stateful("Provider", move || {
            Box::new(ProviderComponent::<T> {
                key,
                value: None,
                subscribers: Vec::new(),
            })
        });
        Self {
            key,
            default: Rc::new(default),
            spec,
        }
    }

    /// A provider node for `value`, scoped over `children`.
    ///
    /// The value is wrapped in a fresh shared box, so every render of the
    /// surrounding component counts as a change; use [`provider_shared`]
    /// with a stable `Rc` to keep subscribers quiet across re-renders.
    ///
    /// [`provider_shared`]: Context::provider_shared
    pub fn provider(&self, value: T, children: Vec<ChildSpec>) -> VNode {
        self.provider_shared(Rc::new(value), children)
    }

    /// Like [`Context::provider`] but with caller-controlled identity:
    /// passing the same `Rc` across renders is observed as "unchanged".
    pub fn provider_shared(&self, value: Rc<T>, children: Vec<ChildSpec>) -> VNode {
        let mut attrs = Props::new();
        attrs.insert(Rc::from("value"), PropValue::Data(value as Rc<dyn Any>));
        component(&self.spec, attrs, children)
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }

    pub(crate) fn key(&self) -> ContextKey {
        self.key
    }
}

struct ProviderComponent<T: Clone + 'static> {
    key: ContextKey,
    value: Option<Rc<T>>,
    subscribers: Vec<UpdateHandle>,
}

impl<T: Clone + 'static> Component for ProviderComponent<T> {
    fn render(&mut self, props: &Props, children: &[VNode]) -> Result<VNode, RenderError> {
        let incoming = match props.get("value") {
            Some(PropValue::Data(data)) => Rc::clone(data).downcast::<T>().ok(),
            _ => None,
        };
        let Some(incoming) = incoming else {
            return Err(RenderError::render("context provider value missing"));
        };
        let changed = match &self.value {
            Some(current) => !Rc::ptr_eq(current, &incoming),
            None => false,
        };
        self.value = Some(incoming);
        if changed {
            self.subscribers.retain(|sub| sub.is_alive());
            for subscriber in &self.subscribers {
                subscriber.invalidate();
            }
        }
        Ok(fragment(
            children.iter().cloned().map(ChildSpec::from).collect(),
        ))
    }

    fn provided_key(&self) -> Option<ContextKey> {
        Some(self.key)
    }

    fn provided_value(&self) -> Option<Rc<dyn Any>> {
        self.value.clone().map(|value| value as Rc<dyn Any>)
    }

    fn subscribe(&mut self, subscriber: UpdateHandle) {
        if self
            .subscribers
            .iter()
            .any(|existing| existing.instance == subscriber.instance)
        {
            return;
        }
        self.subscribers.push(subscriber);
    }
}

/// Resolves `context` for the instance rendering under `scope`: nearest
/// providing ancestor wins, falling back to the context default. Also
/// registers the reading instance with the provider it found.
pub(crate) fn read_and_subscribe<T: Clone + 'static>(context: &Context<T>, scope: &ScopeCtx) -> T {
    let mut current = scope
        .node
        .upgrade()
        .and_then(|node| node.borrow().parent.upgrade());
    while let Some(node) = current {
        let instance = node.borrow().instance.clone();
        if let Some(instance) = instance {
            let mut guard = instance.borrow_mut();
            if guard.component.provided_key() == Some(context.key()) {
                guard.component.subscribe(scope.updater.clone());
                if let Some(value) = guard.component.provided_value() {
                    if let Ok(typed) = value.downcast::<T>() {
                        return (*typed).clone();
                    }
                }
                return context.default_value();
            }
        }
        let parent = node.borrow().parent.upgrade();
        current = parent;
    }
    context.default_value()
}
