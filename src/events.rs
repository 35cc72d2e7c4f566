//! Event names and the one-shot waiter surface (`spec.md` §4.E).
//!
//! Events are broadcast to any number of subscribers via
//! [`tokio::sync::broadcast`], the same primitive the kernel's IPC bus uses
//! for zero-copy fan-out. The waiter helpers (`on_empty`, `on_idle`, ...)
//! are a distinct, smaller mechanism: one-shot channels that self-unregister
//! the moment their condition is observed, per the design note recommending
//! "a small channel-based... implementation over mimicking an untyped
//! observer bus."

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::TaskError;

/// A named lifecycle event, broadcast to every active subscriber.
///
/// `Completed`/`Error` carry their payload behind an `Arc` so that
/// broadcasting to many subscribers never requires `T: Clone`.
pub enum QueueEvent<T> {
    Active,
    Add,
    Next,
    Completed(Arc<T>),
    Error(Arc<TaskError>),
    Empty,
    Idle,
    PendingZero,
    RateLimit,
    RateLimitCleared,
}

impl<T> Clone for QueueEvent<T> {
    fn clone(&self) -> Self {
        match self {
            QueueEvent::Active => QueueEvent::Active,
            QueueEvent::Add => QueueEvent::Add,
            QueueEvent::Next => QueueEvent::Next,
            QueueEvent::Completed(v) => QueueEvent::Completed(Arc::clone(v)),
            QueueEvent::Error(e) => QueueEvent::Error(Arc::clone(e)),
            QueueEvent::Empty => QueueEvent::Empty,
            QueueEvent::Idle => QueueEvent::Idle,
            QueueEvent::PendingZero => QueueEvent::PendingZero,
            QueueEvent::RateLimit => QueueEvent::RateLimit,
            QueueEvent::RateLimitCleared => QueueEvent::RateLimitCleared,
        }
    }
}

/// One-shot waiter registries, checked and drained as conditions become
/// true. Lives inside the queue's locked state so registration and
/// resolution share the same critical section as the mutation that might
/// satisfy them.
#[derive(Default)]
pub(crate) struct Waiters {
    pub empty: Vec<oneshot::Sender<()>>,
    pub idle: Vec<oneshot::Sender<()>>,
    pub pending_zero: Vec<oneshot::Sender<()>>,
    pub size_less_than: Vec<(usize, oneshot::Sender<()>)>,
    pub rate_limited: Vec<oneshot::Sender<()>>,
    pub rate_limit_cleared: Vec<oneshot::Sender<()>>,
    pub error: Vec<oneshot::Sender<Arc<TaskError>>>,
}

impl Waiters {
    pub fn fire_empty(&mut self) {
        for tx in self.empty.drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn fire_idle(&mut self) {
        for tx in self.idle.drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn fire_pending_zero(&mut self) {
        for tx in self.pending_zero.drain(..) {
            let _ = tx.send(());
        }
    }

    /// Re-checked on every `next`: any waiter whose threshold now exceeds
    /// `size` fires and is removed; the rest remain registered.
    pub fn check_size_less_than(&mut self, size: usize) {
        let mut remaining = Vec::with_capacity(self.size_less_than.len());
        for (threshold, tx) in self.size_less_than.drain(..) {
            if size < threshold {
                let _ = tx.send(());
            } else {
                remaining.push((threshold, tx));
            }
        }
        self.size_less_than = remaining;
    }

    pub fn fire_rate_limited(&mut self) {
        for tx in self.rate_limited.drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn fire_rate_limit_cleared(&mut self) {
        for tx in self.rate_limit_cleared.drain(..) {
            let _ = tx.send(());
        }
    }

    pub fn fire_error(&mut self, err: Arc<TaskError>) {
        for tx in self.error.drain(..) {
            let _ = tx.send(Arc::clone(&err));
        }
    }
}
