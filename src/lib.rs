//! An embeddable, async, priority-ordered task queue with concurrency
//! control and interval rate limiting.
//!
//! Submit work with [`TaskQueue::add`]; the queue admits tasks in priority
//! order (ties broken by submission order), never running more than
//! `concurrency` at once, and -- if configured -- never admitting more than
//! `interval_cap` tasks per `interval`, in either a fixed-window or strict
//! sliding-window mode.
//!
//! ```no_run
//! use pqueue::{QueueOptions, TaskOptions, TaskQueue};
//!
//! # async fn run() -> pqueue::Result<()> {
//! let queue: TaskQueue<u32> = TaskQueue::new(QueueOptions::new().concurrency(2))?;
//! let result = queue
//!     .add(|_token| async { Ok(21 * 2) }, TaskOptions::new())
//!     .await?
//!     .await;
//! assert_eq!(*result.unwrap(), 42);
//! # Ok(())
//! # }
//! ```
//!
//! # Module layout
//!
//! - [`error`] -- [`QueueError`] (construction / operation failures, derived
//!   via `thiserror`) and [`TaskError`] (a single task's outcome, which
//!   carries a type-erased user error and so implements `std::error::Error`
//!   by hand instead).
//! - [`task`] -- [`TaskId`], [`TaskOptions`], and the type-erased work
//!   representation.
//! - [`options`] -- the [`QueueOptions`] builder and the `Concurrency` /
//!   `IntervalCap` cap types.
//! - [`wait_queue`] -- the [`WaitQueue`] trait and its default
//!   binary-search-insertion implementation.
//! - [`rate_limiter`] -- the fixed-window / strict-sliding-window admission
//!   state machine.
//! - [`events`] -- [`QueueEvent`] (broadcast over `tokio::sync::broadcast`)
//!   and the one-shot waiter registries behind `on_empty` / `on_idle` / etc.
//! - [`queue`] -- [`TaskQueue`] itself: the scheduler drain loop and task
//!   runner that tie everything above together.
//!
//! Observability is structured logging via `tracing`; this crate never
//! installs a subscriber itself -- wire one up in the binary that embeds it.

mod error;
mod events;
mod options;
mod queue;
mod rate_limiter;
mod task;
mod wait_queue;

pub use error::{QueueError, Result, TaskError};
pub use events::QueueEvent;
pub use options::{Concurrency, IntervalCap, QueueOptions};
pub use queue::TaskQueue;
pub use task::{RunningTask, TaskFn, TaskFuture, TaskId, TaskMeta, TaskOptions};
pub use wait_queue::{DefaultWaitQueue, QueuedTask, WaitQueue};
