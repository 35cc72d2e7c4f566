//! Queue error types.
//!
//! Mirroring the distinction the design draws between failures that abort a
//! call synchronously and failures that belong to a single task's lifecycle,
//! this module exposes two enums: [`QueueError`] for construction and
//! setter/operation validation, and [`TaskError`] for the outcome of a single
//! task's execution. Every public fallible API in this crate returns one or
//! the other.

use std::fmt;
use std::sync::Arc;

use crate::task::TaskId;

/// Errors returned synchronously by queue construction and control
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// `concurrency` was not a positive integer (and not the unbounded
    /// sentinel).
    #[error("concurrency must be >= 1, got {value}")]
    InvalidConcurrency { value: i64 },

    /// `interval` was negative or non-finite.
    #[error("interval must be a finite non-negative duration")]
    InvalidInterval,

    /// `interval_cap` was not a positive integer (and not the unbounded
    /// sentinel).
    #[error("interval_cap must be >= 1, got {value}")]
    InvalidIntervalCap { value: i64 },

    /// `timeout` was present but not a positive, finite duration.
    #[error("timeout must be a positive finite duration")]
    InvalidTimeout,

    /// `strict` mode was requested without a usable interval / cap pair.
    #[error("strict mode requires interval > 0 and a finite interval_cap")]
    StrictRequiresInterval,

    /// `set_priority` referenced an id that is not currently waiting.
    #[error("task not found: {id:?}")]
    TaskNotFound { id: TaskId },

    /// The queue has already been closed and no longer accepts `add`.
    #[error("queue is closed")]
    Closed,
}

/// The outcome of a single task's execution, delivered both through the
/// task's own future and mirrored on the `error` event.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// The task's configured timeout elapsed before the function settled.
    Timeout,
    /// The task's cancel token was tripped, either before admission (the
    /// task never ran) or during execution (the awaited race lost).
    Cancelled(Arc<str>),
    /// The user-supplied function returned an error of its own.
    Failed(Arc<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Timeout => write!(f, "task timed out"),
            TaskError::Cancelled(reason) => write!(f, "task cancelled: {reason}"),
            TaskError::Failed(err) => write!(f, "task failed: {err}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TaskError::Failed(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Convenience alias for queue-level (synchronous) results.
pub type Result<T> = std::result::Result<T, QueueError>;
