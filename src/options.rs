//! Construction options for [`crate::TaskQueue`].
//!
//! Follows the builder convention used throughout the wider workspace (see
//! e.g. `TaskQueueConfigBuilder` in the crawler's task queue): every field has
//! a sensible default from `spec.md` §6, and `build`/`new` validates eagerly
//! rather than deferring failure to first use.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{QueueError, Result};
use crate::wait_queue::{DefaultWaitQueue, WaitQueue};

/// The concurrency cap: either a positive number of simultaneously running
/// tasks, or unbounded (limited only by the rate limiter, if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Limited(usize),
    Unbounded,
}

impl Concurrency {
    pub(crate) fn allows(&self, pending: usize) -> bool {
        match self {
            Concurrency::Limited(n) => pending < *n,
            Concurrency::Unbounded => true,
        }
    }

    pub(crate) fn is_saturated(&self, pending: usize) -> bool {
        match self {
            Concurrency::Limited(n) => pending == *n,
            Concurrency::Unbounded => false,
        }
    }
}

/// The admissions-per-interval cap: either a positive count, or unbounded
/// (rate limiting disabled regardless of `interval`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalCap {
    Limited(usize),
    Unbounded,
}

impl IntervalCap {
    pub(crate) fn is_finite(&self) -> bool {
        matches!(self, IntervalCap::Limited(_))
    }
}

/// Construction options, matching `spec.md` §6.
pub struct QueueOptions<T: Send + Sync + 'static> {
    pub(crate) concurrency: Concurrency,
    pub(crate) auto_start: bool,
    pub(crate) interval_cap: IntervalCap,
    pub(crate) interval: Duration,
    pub(crate) carryover_interval_count: bool,
    pub(crate) strict: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) queue_class: Option<Arc<dyn Fn() -> Box<dyn WaitQueue<T>> + Send + Sync>>,
}

impl<T: Send + Sync + 'static> Default for QueueOptions<T> {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Unbounded,
            auto_start: true,
            interval_cap: IntervalCap::Unbounded,
            interval: Duration::ZERO,
            carryover_interval_count: false,
            strict: false,
            timeout: None,
            queue_class: None,
        }
    }
}

impl<T: Send + Sync + 'static> QueueOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = Concurrency::Limited(n);
        self
    }

    #[must_use]
    pub fn unbounded_concurrency(mut self) -> Self {
        self.concurrency = Concurrency::Unbounded;
        self
    }

    #[must_use]
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    #[must_use]
    pub fn interval_cap(mut self, n: usize) -> Self {
        self.interval_cap = IntervalCap::Limited(n);
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn carryover_interval_count(mut self, carryover: bool) -> Self {
        self.carryover_interval_count = carryover;
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Supply an alternative waiting-queue implementation. The capability
    /// contract is `{enqueue, dequeue, filter, set_priority, size}` -- see
    /// [`WaitQueue`] -- not an inheritance hierarchy (`spec.md` §9).
    #[must_use]
    pub fn queue_class<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn WaitQueue<T>> + Send + Sync + 'static,
    {
        self.queue_class = Some(Arc::new(factory));
        self
    }

    /// Validate the combination of options, per `spec.md` §6 "Construction
    /// validation".
    pub(crate) fn validate(&self) -> Result<()> {
        if let Concurrency::Limited(n) = self.concurrency {
            if n == 0 {
                return Err(QueueError::InvalidConcurrency { value: 0 });
            }
        }
        if let IntervalCap::Limited(n) = self.interval_cap {
            if n == 0 {
                return Err(QueueError::InvalidIntervalCap { value: 0 });
            }
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(QueueError::InvalidTimeout);
            }
        }
        if self.strict && (self.interval.is_zero() || !self.interval_cap.is_finite()) {
            return Err(QueueError::StrictRequiresInterval);
        }
        Ok(())
    }

    /// Produce a reusable factory for fresh [`WaitQueue`] instances --
    /// either the caller's `queue_class`, or the default -- so [`clear`]
    /// can rebuild an empty one without remembering which was configured.
    ///
    /// [`clear`]: crate::TaskQueue::clear
    pub(crate) fn wait_queue_factory(&self) -> Arc<dyn Fn() -> Box<dyn WaitQueue<T>> + Send + Sync> {
        match &self.queue_class {
            Some(factory) => Arc::clone(factory),
            None => Arc::new(|| Box::new(DefaultWaitQueue::<T>::new()) as Box<dyn WaitQueue<T>>),
        }
    }
}
