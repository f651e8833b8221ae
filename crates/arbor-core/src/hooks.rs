//! Per-instance ordered hook slots.
//!
//! Each stateful call inside a function component's render reads the slot
//! at the current positional index and advances the cursor; the cursor is
//! reset at render start. Calling hooks in a different number or order
//! across two renders of the same instance is undefined behavior: debug
//! builds assert, release builds log and reinitialize the slot.

use std::any::Any;
use std::cell::RefCell;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::component::RenderError;
use crate::context::{self, Context, ContextKey};
use crate::diff::RenderNode;
use crate::hash::hash_one;
use crate::scheduler::UpdateHandle;

type AnyCell = Rc<RefCell<Box<dyn Any>>>;
type CleanupFn = Box<dyn FnOnce()>;
type EffectFn = Box<dyn FnOnce() -> EffectResult>;

/// What an effect callback hands back: an optional cleanup to run before
/// the next invocation (and unconditionally on unmount), or a failure to
/// route through the boundary-capture path.
#[derive(Default)]
pub struct EffectResult {
    cleanup: Option<CleanupFn>,
    error: Option<RenderError>,
}

impl EffectResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn cleanup(f: impl FnOnce() + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(f)),
            error: None,
        }
    }

    pub fn fail(error: RenderError) -> Self {
        Self {
            cleanup: None,
            error: Some(error),
        }
    }
}

pub(crate) struct StateSlot {
    cell: AnyCell,
}

pub(crate) struct ReducerSlot {
    cell: AnyCell,
}

pub(crate) struct MemoSlot {
    deps: u64,
    value: Rc<dyn Any>,
}

pub(crate) struct EffectSlot {
    deps: Option<u64>,
    pending: Option<EffectFn>,
    cleanup: Option<CleanupFn>,
}

pub(crate) struct ErrorTrapSlot {
    error: Rc<RefCell<Option<RenderError>>>,
}

/// Tagged union over everything a slot can back.
pub(crate) enum HookSlot {
    State(StateSlot),
    Reducer(ReducerSlot),
    Memo(MemoSlot),
    Effect(EffectSlot),
    Context(ContextKey),
    ErrorTrap(ErrorTrapSlot),
    Id(Rc<str>),
}

impl HookSlot {
    fn tag(&self) -> &'static str {
        match self {
            HookSlot::State(_) => "state",
            HookSlot::Reducer(_) => "reducer",
            HookSlot::Memo(_) => "memo",
            HookSlot::Effect(_) => "effect",
            HookSlot::Context(_) => "context",
            HookSlot::ErrorTrap(_) => "error-trap",
            HookSlot::Id(_) => "id",
        }
    }
}

fn misaligned(hook: &str, index: usize, found: &HookSlot) {
    log::warn!(
        "{hook} found a {} slot at index {index}; hook order changed between renders \
         (undefined behavior, reinitializing)",
        found.tag()
    );
    debug_assert!(
        false,
        "hook slot misalignment: {hook} at index {index} found {}",
        found.tag()
    );
}

pub(crate) struct HookList {
    slots: Vec<HookSlot>,
    cursor: usize,
}

impl HookList {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            cursor: 0,
        }
    }

    pub fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Closes a render. When fewer hooks ran than slots exist the tail is
    /// detached and returned so the caller can run its effect cleanups
    /// outside the list borrow.
    pub fn finish(&mut self) -> Vec<HookSlot> {
        if self.cursor < self.slots.len() {
            log::warn!(
                "render used {} hook(s) but {} slot(s) exist; hook count shrank between renders",
                self.cursor,
                self.slots.len()
            );
            debug_assert!(false, "hook count shrank between renders");
            self.slots.split_off(self.cursor)
        } else {
            Vec::new()
        }
    }

    fn advance(&mut self) -> usize {
        let at = self.cursor;
        self.cursor += 1;
        at
    }

    /// The error cell of the first error-trap slot, if the component
    /// declared one during its last render.
    pub fn error_trap(&self) -> Option<Rc<RefCell<Option<RenderError>>>> {
        self.slots.iter().find_map(|slot| match slot {
            HookSlot::ErrorTrap(trap) => Some(Rc::clone(&trap.error)),
            _ => None,
        })
    }

    fn take_cleanups(&mut self) -> Vec<CleanupFn> {
        self.slots
            .iter_mut()
            .filter_map(|slot| match slot {
                HookSlot::Effect(effect) => {
                    effect.pending = None;
                    effect.cleanup.take()
                }
                _ => None,
            })
            .collect()
    }
}

/// Run all outstanding effect cleanups; invoked when the owning instance
/// unmounts, or on a detached misaligned tail.
pub(crate) fn run_cleanups(slots: &mut Vec<HookSlot>) {
    let cleanups: Vec<CleanupFn> = slots
        .iter_mut()
        .filter_map(|slot| match slot {
            HookSlot::Effect(effect) => {
                effect.pending = None;
                effect.cleanup.take()
            }
            _ => None,
        })
        .collect();
    for cleanup in cleanups {
        cleanup();
    }
}

pub(crate) fn teardown(hooks: &Rc<RefCell<HookList>>) {
    let cleanups = hooks.borrow_mut().take_cleanups();
    for cleanup in cleanups {
        cleanup();
    }
}

/// Runs the effects recorded by the instance's last render, oldest slot
/// first. The previous cleanup of each re-run effect fires immediately
/// before its new invocation. Stops at the first failing effect.
pub(crate) fn flush_effects(
    hooks: &Rc<RefCell<HookList>>,
    component: &Rc<str>,
) -> Result<(), RenderError> {
    let mut index = 0;
    loop {
        let job = {
            let mut list = hooks.borrow_mut();
            let mut found = None;
            while index < list.slots.len() {
                if let HookSlot::Effect(slot) = &mut list.slots[index] {
                    if let Some(pending) = slot.pending.take() {
                        found = Some((index, slot.cleanup.take(), pending));
                        break;
                    }
                }
                index += 1;
            }
            found
        };
        let Some((at, cleanup, pending)) = job else {
            return Ok(());
        };
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        let result = pending();
        if let Some(error) = result.error {
            return Err(error.into_effect(component));
        }
        let mut list = hooks.borrow_mut();
        if let Some(HookSlot::Effect(slot)) = list.slots.get_mut(at) {
            slot.cleanup = result.cleanup;
        }
        index = at + 1;
    }
}

/// Everything a hook call needs from the render in progress.
#[derive(Clone)]
pub(crate) struct ScopeCtx {
    pub hooks: Rc<RefCell<HookList>>,
    pub updater: UpdateHandle,
    pub node: Weak<RefCell<RenderNode>>,
}

thread_local! {
    static SCOPES: RefCell<Vec<ScopeCtx>> = RefCell::new(Vec::new());
}

/// Installs `ctx` as the current hook scope for the duration of `f`.
pub(crate) fn with_scope<R>(ctx: ScopeCtx, f: impl FnOnce() -> R) -> R {
    SCOPES.with(|stack| stack.borrow_mut().push(ctx));
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            SCOPES.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
    let _guard = Guard;
    f()
}

fn current_scope(hook: &str) -> ScopeCtx {
    SCOPES.with(|stack| stack.borrow().last().cloned()).unwrap_or_else(|| {
        panic!("{hook} called outside a component render");
    })
}

/// Writes a state cell and schedules the owning instance.
pub struct Setter<T> {
    cell: AnyCell,
    updater: UpdateHandle,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            updater: self.updater.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Setter<T> {
    /// Replaces the stored value. Inside a batch the write coalesces with
    /// any other pending updates; outside one it re-renders synchronously.
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = Box::new(value);
        self.updater.invalidate();
    }

    /// Replaces the stored value with a function of the current one. The
    /// current value already reflects earlier sets from the same batch.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let guard = self.cell.borrow();
            guard.downcast_ref::<T>().map(f)
        };
        match next {
            Some(next) => {
                *self.cell.borrow_mut() = Box::new(next);
                self.updater.invalidate();
            }
            None => log::warn!("state setter type no longer matches its slot; update dropped"),
        }
    }
}

/// A state cell: returns the current value and a setter that schedules a
/// re-render of the owning instance.
pub fn use_state<T: Clone + 'static>(init: impl FnOnce() -> T) -> (T, Setter<T>) {
    let scope = current_scope("use_state");
    let hooks = Rc::clone(&scope.hooks);
    let mut init = Some(init);
    let cell = {
        let mut list = hooks.borrow_mut();
        let at = list.advance();
        if at == list.slots.len() {
            let value: Box<dyn Any> = Box::new((init.take().unwrap())());
            list.slots.push(HookSlot::State(StateSlot {
                cell: Rc::new(RefCell::new(value)),
            }));
        } else if !matches!(list.slots[at], HookSlot::State(_)) {
            misaligned("use_state", at, &list.slots[at]);
            let value: Box<dyn Any> = Box::new((init.take().unwrap())());
            list.slots[at] = HookSlot::State(StateSlot {
                cell: Rc::new(RefCell::new(value)),
            });
        }
        let HookSlot::State(slot) = &list.slots[at] else {
            unreachable!()
        };
        Rc::clone(&slot.cell)
    };
    let value = {
        let guard = cell.borrow();
        guard.downcast_ref::<T>().cloned()
    };
    let value = match value {
        Some(value) => value,
        None => {
            // Slot survived but its payload type changed: misuse; restart.
            log::warn!("use_state slot holds a different type; reinitializing");
            let fresh = (init.take().expect("fresh state slot holds foreign type"))();
            *cell.borrow_mut() = Box::new(fresh.clone());
            fresh
        }
    };
    (
        value,
        Setter {
            cell,
            updater: scope.updater.clone(),
            _marker: PhantomData,
        },
    )
}

/// Dispatches actions through the reducer bound at this slot.
pub struct Dispatch<A> {
    apply: Rc<dyn Fn(A)>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            apply: Rc::clone(&self.apply),
        }
    }
}

impl<A> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        (self.apply)(action);
    }
}

/// A reducer binding: local state advanced by dispatched actions. The
/// reducer runs eagerly at dispatch time, so successive dispatches inside
/// one batch each observe the previous one's result.
pub fn use_reducer<S, A, R>(reducer: R, init: impl FnOnce() -> S) -> (S, Dispatch<A>)
where
    S: Clone + 'static,
    A: 'static,
    R: Fn(&S, A) -> S + 'static,
{
    let scope = current_scope("use_reducer");
    let hooks = Rc::clone(&scope.hooks);
    let mut init = Some(init);
    let cell = {
        let mut list = hooks.borrow_mut();
        let at = list.advance();
        if at == list.slots.len() {
            let value: Box<dyn Any> = Box::new((init.take().unwrap())());
            list.slots.push(HookSlot::Reducer(ReducerSlot {
                cell: Rc::new(RefCell::new(value)),
            }));
        } else if !matches!(list.slots[at], HookSlot::Reducer(_)) {
            misaligned("use_reducer", at, &list.slots[at]);
            let value: Box<dyn Any> = Box::new((init.take().unwrap())());
            list.slots[at] = HookSlot::Reducer(ReducerSlot {
                cell: Rc::new(RefCell::new(value)),
            });
        }
        let HookSlot::Reducer(slot) = &list.slots[at] else {
            unreachable!()
        };
        Rc::clone(&slot.cell)
    };
    let value = {
        let guard = cell.borrow();
        guard.downcast_ref::<S>().cloned()
    };
    let value = match value {
        Some(value) => value,
        None => {
            log::warn!("use_reducer slot holds a different type; reinitializing");
            let fresh = (init.take().expect("fresh reducer slot holds foreign type"))();
            *cell.borrow_mut() = Box::new(fresh.clone());
            fresh
        }
    };
    let apply = {
        let cell = Rc::clone(&cell);
        let updater = scope.updater.clone();
        Rc::new(move |action: A| {
            let next = {
                let guard = cell.borrow();
                guard.downcast_ref::<S>().map(|state| reducer(state, action))
            };
            match next {
                Some(next) => {
                    *cell.borrow_mut() = Box::new(next);
                    updater.invalidate();
                }
                None => log::warn!("reducer slot type no longer matches; dispatch dropped"),
            }
        })
    };
    (value, Dispatch { apply })
}

/// A memoized value, recomputed only when the dependency fingerprint
/// changes.
pub fn use_memo<T: 'static, D: Hash>(deps: &D, compute: impl FnOnce() -> T) -> Rc<T> {
    let scope = current_scope("use_memo");
    let hooks = Rc::clone(&scope.hooks);
    let fingerprint = hash_one(deps);
    let mut compute = Some(compute);
    let stored: Rc<dyn Any> = {
        let mut list = hooks.borrow_mut();
        let at = list.advance();
        if at == list.slots.len() {
            list.slots.push(HookSlot::Memo(MemoSlot {
                deps: fingerprint,
                value: Rc::new((compute.take().unwrap())()),
            }));
        } else {
            match &mut list.slots[at] {
                HookSlot::Memo(slot) => {
                    if slot.deps != fingerprint {
                        slot.deps = fingerprint;
                        slot.value = Rc::new((compute.take().unwrap())());
                    }
                }
                other => {
                    misaligned("use_memo", at, other);
                    list.slots[at] = HookSlot::Memo(MemoSlot {
                        deps: fingerprint,
                        value: Rc::new((compute.take().unwrap())()),
                    });
                }
            }
        }
        let HookSlot::Memo(slot) = &list.slots[at] else {
            unreachable!()
        };
        Rc::clone(&slot.value)
    };
    match stored.downcast::<T>() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("use_memo slot holds a different type; recomputing");
            let value = Rc::new((compute.take().expect("fresh memo slot holds foreign type"))());
            let mut list = hooks.borrow_mut();
            let at = list.cursor - 1;
            list.slots[at] = HookSlot::Memo(MemoSlot {
                deps: fingerprint,
                value: Rc::clone(&value) as Rc<dyn Any>,
            });
            value
        }
    }
}

/// A mutable box that survives re-renders without scheduling any.
pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
    use_memo(&(), move || RefCell::new(init()))
}

/// Reads the nearest providing ancestor for `context` and subscribes this
/// instance to its changes.
pub fn use_context<T: Clone + 'static>(context: &Context<T>) -> T {
    let scope = current_scope("use_context");
    {
        let hooks = Rc::clone(&scope.hooks);
        let mut list = hooks.borrow_mut();
        let at = list.advance();
        if at == list.slots.len() {
            list.slots.push(HookSlot::Context(context.key()));
        } else {
            match &mut list.slots[at] {
                HookSlot::Context(key) => *key = context.key(),
                other => {
                    misaligned("use_context", at, other);
                    list.slots[at] = HookSlot::Context(context.key());
                }
            }
        }
    }
    context::read_and_subscribe(context, &scope)
}

/// Clears a captured boundary error and re-renders the boundary.
#[derive(Clone)]
pub struct BoundaryReset {
    error: Rc<RefCell<Option<RenderError>>>,
    updater: UpdateHandle,
}

impl BoundaryReset {
    pub fn reset(&self) {
        if self.error.borrow_mut().take().is_some() {
            self.updater.invalidate();
        }
    }
}

/// Declares this instance an error boundary. Returns the error captured
/// from the failing descendant subtree, if any, and a reset handle. While
/// an error is captured the component renders its fallback output.
pub fn use_error_boundary() -> (Option<RenderError>, BoundaryReset) {
    let scope = current_scope("use_error_boundary");
    let hooks = Rc::clone(&scope.hooks);
    let error = {
        let mut list = hooks.borrow_mut();
        let at = list.advance();
        if at == list.slots.len() {
            list.slots.push(HookSlot::ErrorTrap(ErrorTrapSlot {
                error: Rc::new(RefCell::new(None)),
            }));
        } else if !matches!(list.slots[at], HookSlot::ErrorTrap(_)) {
            misaligned("use_error_boundary", at, &list.slots[at]);
            list.slots[at] = HookSlot::ErrorTrap(ErrorTrapSlot {
                error: Rc::new(RefCell::new(None)),
            });
        }
        let HookSlot::ErrorTrap(slot) = &list.slots[at] else {
            unreachable!()
        };
        Rc::clone(&slot.error)
    };
    let captured = error.borrow().clone();
    (
        captured,
        BoundaryReset {
            error,
            updater: scope.updater.clone(),
        },
    )
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// A stable identity token for this slot, minted once per mount.
pub fn use_id() -> Rc<str> {
    let scope = current_scope("use_id");
    let hooks = Rc::clone(&scope.hooks);
    let mut list = hooks.borrow_mut();
    let at = list.advance();
    if at == list.slots.len() {
        let id = NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed);
        list.slots.push(HookSlot::Id(Rc::from(format!("arbor-{id}"))));
    } else if !matches!(list.slots[at], HookSlot::Id(_)) {
        misaligned("use_id", at, &list.slots[at]);
        let id = NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed);
        list.slots[at] = HookSlot::Id(Rc::from(format!("arbor-{id}")));
    }
    let HookSlot::Id(id) = &list.slots[at] else {
        unreachable!()
    };
    Rc::clone(id)
}

/// Records an effect for this position. Runs after the host structure has
/// committed for the pass; skipped when `deps` hashes to the same
/// fingerprint as the previous run. The previous cleanup runs right
/// before the new invocation and unconditionally on unmount.
pub fn use_effect<D: Hash>(deps: &D, effect: impl FnOnce() -> EffectResult + 'static) {
    let scope = current_scope("use_effect");
    let hooks = Rc::clone(&scope.hooks);
    let fingerprint = hash_one(deps);
    let mut list = hooks.borrow_mut();
    let at = list.advance();
    if at == list.slots.len() {
        list.slots.push(HookSlot::Effect(EffectSlot {
            deps: None,
            pending: None,
            cleanup: None,
        }));
    } else if !matches!(list.slots[at], HookSlot::Effect(_)) {
        misaligned("use_effect", at, &list.slots[at]);
        list.slots[at] = HookSlot::Effect(EffectSlot {
            deps: None,
            pending: None,
            cleanup: None,
        });
    }
    let HookSlot::Effect(slot) = &mut list.slots[at] else {
        unreachable!()
    };
    if slot.deps != Some(fingerprint) {
        slot.deps = Some(fingerprint);
        slot.pending = Some(Box::new(effect));
    }
}
