//! Entry points: a [`Root`] ties a render tree to one host container.
//!
//! `render` diffs against the tree previously committed into the
//! container (or empty) and is idempotent: re-rendering a structurally
//! identical description performs zero host mutations. `hydrate` adopts
//! pre-rendered host children instead of creating fresh output wherever
//! the shape check passes.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::component::RenderError;
use crate::diff::{self, DiffCtx, EffectEntry, Link};
use crate::hooks;
use crate::host::{Event, Host, HostId};
use crate::intercept;
use crate::node::{Kind, VNode};
use crate::scheduler::{FrameWaker, SchedulerInner};

pub struct Root {
    inner: Rc<RootInner>,
}

struct RootInner {
    host: Rc<RefCell<dyn Host>>,
    container: HostId,
    tree: RefCell<Option<Link>>,
    scheduler: Rc<SchedulerInner>,
    pending_error: RefCell<Option<RenderError>>,
}

impl Root {
    /// Associates a new (empty) render tree with `container`.
    pub fn new(host: Rc<RefCell<dyn Host>>, container: HostId) -> Self {
        let scheduler = SchedulerInner::new();
        let inner = Rc::new(RootInner {
            host,
            container,
            tree: RefCell::new(None),
            scheduler: Rc::clone(&scheduler),
            pending_error: RefCell::new(None),
        });
        let weak = Rc::downgrade(&inner);
        scheduler.set_flush(Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Err(err) = inner.drain() {
                    log::error!("update pass failed outside an entry call: {err}");
                    *inner.pending_error.borrow_mut() = Some(err);
                }
            }
        }));
        Self { inner }
    }

    pub fn container(&self) -> HostId {
        self.inner.container
    }

    /// Diffs `node` against the committed tree and applies the deltas.
    pub fn render(&self, node: VNode) -> Result<(), RenderError> {
        self.inner.commit(node, false)
    }

    /// Like [`Root::render`], but adopts matching host structure already
    /// present in the container (an external pre-render) instead of
    /// creating output handles, falling back to creation where the shape
    /// check fails. Leftover pre-rendered nodes are released.
    pub fn hydrate(&self, node: VNode) -> Result<(), RenderError> {
        self.inner.commit(node, true)
    }

    /// Tears down the committed tree and detaches its output.
    pub fn unmount(&self) -> Result<(), RenderError> {
        self.inner.unmount_tree()
    }

    /// Runs `f` as one batch boundary: state updates issued inside are
    /// coalesced into a single diff/commit pass that runs after `f`
    /// returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R, RenderError> {
        self.inner.scheduler.enter_batch();
        let value = f();
        let closed = self.inner.scheduler.exit_batch();
        if closed && !self.inner.scheduler.in_pass() {
            self.inner.drain()?;
        }
        Ok(value)
    }

    /// Delivers `event` to the listener bound on `target`, inside a
    /// batch. Returns whether a listener was bound.
    pub fn dispatch(&self, target: HostId, event: &Event) -> Result<bool, RenderError> {
        let handler = self.inner.host.borrow().listener(target, event.name());
        match handler {
            Some(handler) => self.batch(|| {
                handler.invoke(event);
                true
            }),
            None => Ok(false),
        }
    }

    /// Drains updates queued while no synchronous flush could run, and
    /// surfaces any error a setter-triggered pass produced in between.
    pub fn flush(&self) -> Result<(), RenderError> {
        if let Some(err) = self.inner.pending_error.borrow_mut().take() {
            return Err(err);
        }
        self.inner.drain()
    }

    pub fn take_error(&self) -> Option<RenderError> {
        self.inner.pending_error.borrow_mut().take()
    }

    pub fn set_frame_waker(&self, waker: Option<Rc<dyn FrameWaker>>) {
        self.inner.scheduler.set_waker(waker);
    }

    /// In deferred mode state updates never flush synchronously; they
    /// wait for [`Root::flush`] (the frame waker signals that one is
    /// due). The default is synchronous.
    pub fn set_deferred(&self, deferred: bool) {
        self.inner.scheduler.set_deferred(deferred);
    }

    /// Whether updates are queued and waiting for a flush.
    pub fn has_pending(&self) -> bool {
        self.inner.scheduler.has_pending()
    }
}

impl RootInner {
    fn commit(&self, node: VNode, hydrate: bool) -> Result<(), RenderError> {
        if !self.scheduler.begin_pass() {
            return Err(RenderError::render("re-entrant render pass"));
        }
        let result = self.commit_inner(node, hydrate);
        let drained = self.drain_inner();
        self.scheduler.end_pass();
        result.and(drained)
    }

    fn commit_inner(&self, node: VNode, hydrate: bool) -> Result<(), RenderError> {
        let old = self.tree.borrow().clone();
        // Adoption only applies to the first commit into a container.
        let hydrating = hydrate && old.is_none();
        log::trace!(
            "commit pass into container {} (hydrating: {hydrating})",
            self.container
        );
        let after_commit = intercept::after_commit_active().then(|| node.clone());
        let mut commits = Vec::new();
        let mut effects = Vec::new();
        let result = {
            let mut host = self.host.borrow_mut();
            let adopt_cursor = if hydrating {
                host.first_child(self.container)
            } else {
                None
            };
            let mut ctx = DiffCtx {
                host: &mut *host,
                commits: &mut commits,
                effects: &mut effects,
                scheduler: Rc::clone(&self.scheduler),
                hydrating,
                adopt_cursor,
            };
            let mut anchor = None;
            let outcome = diff::diff_node(
                &mut ctx,
                self.container,
                old.clone(),
                node,
                &Weak::new(),
                &mut anchor,
                0,
            );
            match outcome {
                Ok(link) if hydrating => {
                    diff::release_unclaimed_in(&mut ctx, self.container).map(|()| link)
                }
                other => other,
            }
        };
        match &result {
            Ok(link) => *self.tree.borrow_mut() = Some(Rc::clone(link)),
            Err(_) => {
                // Every position is committed to either its old or new
                // description; the old root stays unless it was unmounted.
                let restored = old.filter(|link| !link.borrow().dead);
                *self.tree.borrow_mut() = restored;
            }
        }
        diff::run_commits(commits);
        if let Some(node) = after_commit {
            intercept::fire_after_commit(&node);
        }
        let effect_result = self.flush_effects(effects);
        result.map(|_| ()).and(effect_result)
    }

    fn flush_effects(&self, effects: Vec<EffectEntry>) -> Result<(), RenderError> {
        for entry in effects {
            let gone = entry
                .node
                .upgrade()
                .map(|link| link.borrow().dead)
                .unwrap_or(true);
            if gone {
                continue;
            }
            let (hooks, name) = {
                let instance = entry.instance.borrow();
                (Rc::clone(&instance.hooks), Rc::clone(&instance.name))
            };
            if let Err(err) = hooks::flush_effects(&hooks, &name) {
                if !diff::dispatch_to_boundary(&entry.node, &err) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn drain(&self) -> Result<(), RenderError> {
        if !self.scheduler.begin_pass() {
            // A pass further up the stack owns the drain.
            return Ok(());
        }
        let result = self.drain_inner();
        self.scheduler.end_pass();
        result
    }

    fn drain_inner(&self) -> Result<(), RenderError> {
        loop {
            let mut entries = self.scheduler.take_queue();
            if entries.is_empty() {
                return Ok(());
            }
            entries.sort_by_key(|entry| {
                entry
                    .node
                    .upgrade()
                    .map(|link| link.borrow().depth)
                    .unwrap_or(usize::MAX)
            });
            let mut iter = entries.into_iter();
            while let Some(entry) = iter.next() {
                if !self.scheduler.is_dirty(entry.instance) {
                    continue;
                }
                let Some(link) = entry.node.upgrade() else {
                    self.scheduler.mark_clean(entry.instance);
                    continue;
                };
                if link.borrow().dead {
                    self.scheduler.mark_clean(entry.instance);
                    continue;
                }
                if let Err(err) = self.rerender(link) {
                    self.scheduler.requeue(iter.collect());
                    return Err(err);
                }
            }
        }
    }

    /// One state-driven subtree pass: re-renders a dirty instance with
    /// its committed props and children.
    fn rerender(&self, link: Link) -> Result<(), RenderError> {
        let Some(parts) = ({
            let node = link.borrow();
            match node.kind.clone() {
                Kind::Component(spec) => Some((
                    spec,
                    node.props.clone(),
                    node.comp_children.clone(),
                    node.key,
                    node.node_ref.clone(),
                    node.depth,
                )),
                _ => None,
            }
        }) else {
            return Ok(());
        };
        let (spec, props, comp_children, key, node_ref, depth) = parts;
        log::trace!("re-rendering dirty <{}/> at depth {depth}", spec.name());
        let parent_host = diff::host_parent_of(&link, self.container);
        let mut anchor = diff::host_prev_of(&link);
        let mut commits = Vec::new();
        let mut effects = Vec::new();
        let result = {
            let mut host = self.host.borrow_mut();
            let mut ctx = DiffCtx {
                host: &mut *host,
                commits: &mut commits,
                effects: &mut effects,
                scheduler: Rc::clone(&self.scheduler),
                hydrating: false,
                adopt_cursor: None,
            };
            diff::update_component(
                &mut ctx,
                parent_host,
                Rc::clone(&link),
                spec,
                props,
                comp_children,
                key,
                node_ref,
                &mut anchor,
                depth,
                true,
            )
        };
        diff::run_commits(commits);
        if intercept::after_commit_active() {
            let snapshot = {
                let node = link.borrow();
                VNode {
                    kind: node.kind.clone(),
                    props: node.props.clone(),
                    children: node.comp_children.clone(),
                    key: node.key,
                    node_ref: None,
                }
            };
            intercept::fire_after_commit(&snapshot);
        }
        let effect_result = self.flush_effects(effects);
        result.map(|_| ()).and(effect_result)
    }

    fn unmount_tree(&self) -> Result<(), RenderError> {
        if !self.scheduler.begin_pass() {
            return Err(RenderError::render("re-entrant render pass"));
        }
        let result = (|| {
            let Some(link) = self.tree.borrow_mut().take() else {
                return Ok(());
            };
            let mut commits = Vec::new();
            let mut effects = Vec::new();
            let mut host = self.host.borrow_mut();
            let mut ctx = DiffCtx {
                host: &mut *host,
                commits: &mut commits,
                effects: &mut effects,
                scheduler: Rc::clone(&self.scheduler),
                hydrating: false,
                adopt_cursor: None,
            };
            diff::unmount(&mut ctx, &link, true)
        })();
        self.scheduler.end_pass();
        result
    }
}
