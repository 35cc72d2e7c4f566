//! The priority-ordered container of waiting tasks (`spec.md` §4.A).
//!
//! [`WaitQueue`] is the capability contract the scheduler drives --
//! `{enqueue, dequeue, filter, set_priority, size}` -- expressed as a trait
//! rather than a base class, per the design note in §9. [`DefaultWaitQueue`]
//! is the built-in implementation; callers needing a different storage
//! strategy (e.g. a bounded ring, or one backed by persistent storage) can
//! supply their own via [`crate::QueueOptions::queue_class`].

use crate::error::{QueueError, Result};
use crate::task::{TaskFn, TaskId, TaskMeta};
use tokio_util::sync::CancellationToken;

/// One task sitting in the wait queue: its scheduling metadata plus the
/// closure that will be invoked on admission.
pub struct QueuedTask<T> {
    pub meta: TaskMeta,
    pub work: TaskFn<T>,
    pub cancel_token: Option<CancellationToken>,
    pub resolver:
        tokio::sync::oneshot::Sender<std::result::Result<std::sync::Arc<T>, crate::error::TaskError>>,
}

/// The ordering contract a waiting-task container must honour: priority
/// descending, insertion order ascending among equal priorities.
pub trait WaitQueue<T>: Send {
    /// Insert a new record. Implementations must preserve the stability
    /// invariant described above.
    fn enqueue(&mut self, task: QueuedTask<T>);

    /// Remove and return the head (highest priority, earliest of ties).
    fn dequeue(&mut self) -> Option<QueuedTask<T>>;

    /// Non-destructive snapshot of metadata for every waiting task matching
    /// `predicate`. Backs `size_by`.
    fn filter(&self, predicate: &dyn Fn(&TaskMeta) -> bool) -> Vec<TaskMeta>;

    /// Re-prioritize the first waiting task with a matching id. Only
    /// affects waiting tasks; the scheduler does not touch already-running
    /// ones.
    fn set_priority(&mut self, id: &TaskId, priority: i32) -> Result<()>;

    /// Count of waiting records.
    fn size(&self) -> usize;
}

/// The built-in [`WaitQueue`]: a priority-sorted `Vec` with binary-search
/// insertion, as specified in `spec.md` §4.A.
pub struct DefaultWaitQueue<T> {
    items: Vec<QueuedTask<T>>,
}

impl<T> DefaultWaitQueue<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Index at which `priority` should be inserted to keep `items` sorted
    /// priority-descending, stable on ties (new entries with equal priority
    /// go after existing ones with the same priority).
    fn insertion_index(&self, priority: i32) -> usize {
        // Fast path: append when empty or the new priority does not beat
        // the current tail (`spec.md` §4.A enqueue contract, O(1) case).
        if self.items.is_empty() {
            return 0;
        }
        if self.items.last().unwrap().meta.priority >= priority {
            return self.items.len();
        }
        // Binary search for the first index whose priority is strictly
        // less than `priority` -- that is where the new record belongs,
        // ahead of every existing entry of the same priority.
        self.items.partition_point(|q| q.meta.priority >= priority)
    }
}

impl<T> Default for DefaultWaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync> WaitQueue<T> for DefaultWaitQueue<T> {
    fn enqueue(&mut self, task: QueuedTask<T>) {
        let index = self.insertion_index(task.meta.priority);
        self.items.insert(index, task);
    }

    fn dequeue(&mut self) -> Option<QueuedTask<T>> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    fn filter(&self, predicate: &dyn Fn(&TaskMeta) -> bool) -> Vec<TaskMeta> {
        self.items
            .iter()
            .map(|q| &q.meta)
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    fn set_priority(&mut self, id: &TaskId, priority: i32) -> Result<()> {
        let pos = self
            .items
            .iter()
            .position(|q| &q.meta.id == id)
            .ok_or_else(|| QueueError::TaskNotFound { id: id.clone() })?;
        let mut task = self.items.remove(pos);
        task.meta.priority = priority;
        self.enqueue(task);
        Ok(())
    }

    fn size(&self) -> usize {
        self.items.len()
    }
}
