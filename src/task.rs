//! Task identity and submission options.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Identifies a task across its lifetime.
///
/// Auto-assigned identifiers live in a namespace disjoint from any
/// caller-supplied string, so a caller can never accidentally shadow an
/// internal id (or vice versa) -- see `spec.md` §3, "distinct from any
/// user-provided string namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TaskId {
    /// Assigned by the queue at submission time from its monotonic counter.
    Auto(u64),
    /// Supplied by the caller via [`TaskOptions::id`].
    Named(String),
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskId::Auto(n) => write!(f, "#{n}"),
            TaskId::Named(s) => write!(f, "{s}"),
        }
    }
}

/// Per-task submission options, matching `spec.md` §6 "Per-task options".
#[derive(Default)]
pub struct TaskOptions {
    /// Higher runs earlier. Default 0.
    pub priority: i32,
    /// Caller-chosen identifier; auto-assigned if absent.
    pub id: Option<String>,
    /// Overrides the queue's default timeout for this task only.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation handle; the queue subscribes to it only
    /// while the task is running or about to run.
    pub cancel_token: Option<CancellationToken>,
}

impl TaskOptions {
    /// Options equivalent to omitting every field (priority 0, no id
    /// override, inherit the queue's default timeout, no cancel token).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority (builder style).
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set an explicit id (builder style).
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Override the default timeout (builder style).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancel token (builder style).
    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// A boxed, type-erased unit of work. Every task submitted to a given
/// [`crate::TaskQueue<T>`] shares the same result type `T`; heterogeneous
/// result types are expected to be unified by the caller (e.g. via an enum)
/// before submission, the idiomatic Rust analogue of an untyped `unknown`
/// result.
pub type TaskFuture<T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, crate::error::TaskError>> + Send>>;

/// A type-erased unit of work, as accepted by
/// [`crate::TaskQueue::add_all`] for batches that don't share one concrete
/// closure type. Build one with `Box::new(move |token| Box::pin(body) as _)`.
pub type TaskFn<T> = Box<dyn FnOnce(CancellationToken) -> TaskFuture<T> + Send>;

/// Metadata describing a waiting or running task, independent of its
/// closure. Used by the wait queue, by `size_by`, and by `running_tasks`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskMeta {
    pub id: TaskId,
    pub priority: i32,
    /// Insertion sequence number, used to break priority ties in favour of
    /// submission order (`spec.md` §4.A stability requirement).
    pub(crate) seq: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub timeout: Option<Duration>,
}

/// A snapshot of a currently-running task, as returned by
/// [`crate::TaskQueue::running_tasks`].
#[derive(Debug, Clone)]
pub struct RunningTask {
    pub id: TaskId,
    pub priority: i32,
    pub start_time: Instant,
    pub timeout: Option<Duration>,
}
