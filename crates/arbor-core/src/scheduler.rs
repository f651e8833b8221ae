//! Update scheduling and batching.
//!
//! Single-threaded and cooperative: a re-render always runs to completion
//! on the calling context. State updates mark an instance dirty here; the
//! root drains the dirty set in ascending tree-depth order, so a parent
//! whose re-render already refreshed a child supersedes the child's own
//! pending entry.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::collections::map::HashSet;
use crate::diff::RenderNode;

/// Notified when updates are queued at a moment no synchronous flush can
/// run (deferred mode, or mid-pass). The embedder reacts by calling
/// `Root::flush` once its frame settles.
pub trait FrameWaker {
    fn wake(&self);
}

pub(crate) struct QueueEntry {
    pub instance: usize,
    pub node: Weak<RefCell<RenderNode>>,
}

pub(crate) struct SchedulerInner {
    dirty: RefCell<HashSet<usize>>,
    queue: RefCell<Vec<QueueEntry>>,
    batch_depth: Cell<u32>,
    active: Cell<bool>,
    deferred: Cell<bool>,
    waker: RefCell<Option<Rc<dyn FrameWaker>>>,
    flush: RefCell<Option<Rc<dyn Fn()>>>,
}

impl SchedulerInner {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            dirty: RefCell::new(HashSet::new()),
            queue: RefCell::new(Vec::new()),
            batch_depth: Cell::new(0),
            active: Cell::new(false),
            deferred: Cell::new(false),
            waker: RefCell::new(None),
            flush: RefCell::new(None),
        })
    }

    pub fn set_flush(&self, flush: Rc<dyn Fn()>) {
        *self.flush.borrow_mut() = Some(flush);
    }

    pub fn set_waker(&self, waker: Option<Rc<dyn FrameWaker>>) {
        *self.waker.borrow_mut() = waker;
    }

    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.set(deferred);
    }

    /// Records a dirty instance. Outside a batch and outside a pass this
    /// triggers an immediate synchronous flush; otherwise the entry waits
    /// for the current drain or batch end.
    pub fn invalidate(&self, entry: QueueEntry) {
        if !self.dirty.borrow_mut().insert(entry.instance) {
            return;
        }
        self.queue.borrow_mut().push(entry);
        if self.active.get() || self.batch_depth.get() > 0 {
            return;
        }
        if self.deferred.get() {
            self.wake();
            return;
        }
        let flush = self.flush.borrow().clone();
        if let Some(flush) = flush {
            flush();
        } else {
            self.wake();
        }
    }

    fn wake(&self) {
        let waker = self.waker.borrow().clone();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Clears an instance's dirty flag; returns whether it was set.
    pub fn mark_clean(&self, instance: usize) -> bool {
        self.dirty.borrow_mut().remove(&instance)
    }

    pub fn is_dirty(&self, instance: usize) -> bool {
        self.dirty.borrow().contains(&instance)
    }

    pub fn take_queue(&self) -> Vec<QueueEntry> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Returns unprocessed entries to the queue after an aborted drain.
    pub fn requeue(&self, entries: Vec<QueueEntry>) {
        self.queue.borrow_mut().extend(entries);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    pub fn begin_pass(&self) -> bool {
        !self.active.replace(true)
    }

    pub fn end_pass(&self) {
        self.active.set(false);
    }

    pub fn in_pass(&self) -> bool {
        self.active.get()
    }

    pub fn enter_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    /// Returns true when this call closed the outermost batch.
    pub fn exit_batch(&self) -> bool {
        let depth = self.batch_depth.get();
        debug_assert!(depth > 0, "exit_batch without matching enter_batch");
        let depth = depth.saturating_sub(1);
        self.batch_depth.set(depth);
        depth == 0
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth.get() > 0
    }
}

/// Handle a component instance (or a hook setter) uses to request its own
/// re-render. Weakly tied to both the scheduler and the render-tree
/// position, so it goes inert once either is gone.
#[derive(Clone)]
pub struct UpdateHandle {
    pub(crate) scheduler: Weak<SchedulerInner>,
    pub(crate) node: Weak<RefCell<RenderNode>>,
    pub(crate) instance: usize,
}

impl UpdateHandle {
    /// Marks the owning instance dirty. Coalesced inside a batch or a
    /// running pass; otherwise re-renders synchronously before returning.
    pub fn invalidate(&self) {
        let Some(scheduler) = self.scheduler.upgrade() else {
            return;
        };
        scheduler.invalidate(QueueEntry {
            instance: self.instance,
            node: self.node.clone(),
        });
    }

    pub fn is_alive(&self) -> bool {
        self.scheduler.strong_count() > 0 && self.node.strong_count() > 0
    }
}
