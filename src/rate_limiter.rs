//! Rate-limiter state machine (`spec.md` §4.B).
//!
//! Two modes share one type so the scheduler doesn't need to branch on
//! which is active: fixed-window counts admissions since the last reset,
//! strict (sliding) window keeps a timestamp per admission and evicts
//! anything older than `interval`. The sliding-window approach mirrors the
//! `VecDeque<Instant>` design in the `taskdaemon` scheduler's rate limiter,
//! generalized here into a circular buffer with a start index and a
//! compaction threshold, per the explicit data-model requirement in §3.

use std::time::{Duration, Instant};

use crate::options::IntervalCap;

/// Once the evicted prefix exceeds this many entries *and* is more than
/// half the backing storage, compact it away rather than letting the
/// `Vec` grow unbounded under sustained admission traffic.
const COMPACTION_THRESHOLD: usize = 128;

/// The result of asking the limiter whether another admission is allowed
/// right now.
pub(crate) enum Admission {
    /// Go ahead; `consume` should be called immediately after dequeuing.
    Allowed,
    /// Not yet; wait `retry_after` and ask again.
    Blocked { retry_after: Duration },
}

struct FixedWindow {
    interval_count: usize,
    interval_end: Option<Instant>,
    last_execution_time: Option<Instant>,
}

/// A circular buffer of admission timestamps for strict mode. `start` is
/// the index of the oldest live tick; entries before it are dead and
/// periodically reclaimed.
struct TickBuffer {
    ticks: Vec<Instant>,
    start: usize,
}

impl TickBuffer {
    fn new() -> Self {
        Self {
            ticks: Vec::new(),
            start: 0,
        }
    }

    fn live(&self) -> &[Instant] {
        &self.ticks[self.start..]
    }

    fn push(&mut self, now: Instant) {
        self.ticks.push(now);
    }

    fn pop_last(&mut self) {
        if self.ticks.len() > self.start {
            self.ticks.pop();
        }
    }

    /// Drop every tick older than `now - interval`, advancing `start`.
    fn evict(&mut self, now: Instant, interval: Duration) {
        while self.start < self.ticks.len() {
            let age = now.saturating_duration_since(self.ticks[self.start]);
            if age >= interval {
                self.start += 1;
            } else {
                break;
            }
        }
        self.maybe_compact();
    }

    fn maybe_compact(&mut self) {
        let wasted = self.start;
        let live_or_all_expired = self.start >= self.ticks.len();
        if live_or_all_expired || (wasted > COMPACTION_THRESHOLD && wasted * 2 > self.ticks.len()) {
            self.ticks.drain(..self.start);
            self.start = 0;
        }
    }
}

pub(crate) struct RateLimiter {
    cap: IntervalCap,
    interval: Duration,
    strict: bool,
    carryover: bool,
    fixed: FixedWindow,
    strict_ticks: TickBuffer,
}

impl RateLimiter {
    pub fn new(cap: IntervalCap, interval: Duration, strict: bool, carryover: bool) -> Self {
        Self {
            cap,
            interval,
            strict,
            carryover,
            fixed: FixedWindow {
                interval_count: 0,
                interval_end: None,
                last_execution_time: None,
            },
            strict_ticks: TickBuffer::new(),
        }
    }

    /// The rate limiter is configured ignored iff the cap is unbounded or
    /// the interval is zero (`spec.md` §3 invariant).
    pub fn is_ignored(&self) -> bool {
        matches!(self.cap, IntervalCap::Unbounded) || self.interval.is_zero()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    fn cap_value(&self) -> usize {
        match self.cap {
            IntervalCap::Limited(n) => n,
            IntervalCap::Unbounded => usize::MAX,
        }
    }

    /// Ask whether an admission is permitted right now; if not, how long
    /// to wait. `pending` is used for the fixed-window carryover reset.
    pub fn check(&mut self, now: Instant, pending: usize) -> Admission {
        if self.is_ignored() {
            return Admission::Allowed;
        }
        if self.strict {
            self.check_strict(now)
        } else {
            self.check_fixed(now, pending)
        }
    }

    fn check_strict(&mut self, now: Instant) -> Admission {
        self.strict_ticks.evict(now, self.interval);
        let live = self.strict_ticks.live();
        if live.len() < self.cap_value() {
            Admission::Allowed
        } else {
            let oldest = live[0];
            let elapsed = now.saturating_duration_since(oldest);
            let retry_after = self.interval.saturating_sub(elapsed);
            Admission::Blocked { retry_after }
        }
    }

    fn check_fixed(&mut self, now: Instant, pending: usize) -> Admission {
        let window_active = self.fixed.interval_end.is_some_and(|end| end > now);
        if window_active {
            // Within an active window, admission is gated purely by
            // `allows-another()` (`interval_count < interval_cap`) -- the
            // window boundary itself only matters once the cap has been
            // reached, at which point nothing more is admitted until the
            // window rolls over (`spec.md` §4.B).
            if self.fixed.interval_count < self.cap_value() {
                return Admission::Allowed;
            }
            let end = self.fixed.interval_end.unwrap();
            return Admission::Blocked {
                retry_after: end.saturating_duration_since(now),
            };
        }

        if let Some(last) = self.fixed.last_execution_time {
            // No window currently armed, but spacing from the previous
            // admission hasn't elapsed -- preserves spacing even after a
            // fully idle gap between tasks (`spec.md` §4.B).
            let since = now.saturating_duration_since(last);
            if since < self.interval {
                return Admission::Blocked {
                    retry_after: self.interval - since,
                };
            }
        }

        // Window has rolled over (or never started): reset the count and
        // allow.
        self.fixed.interval_count = if self.carryover { pending } else { 0 };
        self.fixed.interval_end = None;
        Admission::Allowed
    }

    /// Record an admission at `now`.
    pub fn consume(&mut self, now: Instant) {
        if self.is_ignored() {
            return;
        }
        if self.strict {
            self.strict_ticks.push(now);
        } else {
            self.fixed.interval_count += 1;
            self.fixed.last_execution_time = Some(now);
            if self.fixed.interval_end.is_none() {
                self.fixed.interval_end = Some(now + self.interval);
            }
        }
    }

    /// Undo the most recent `consume`, used when an admission is aborted
    /// before the task actually ran (pre-start cancellation).
    pub fn rollback(&mut self) {
        if self.is_ignored() {
            return;
        }
        if self.strict {
            self.strict_ticks.pop_last();
        } else {
            self.fixed.interval_count = self.fixed.interval_count.saturating_sub(1);
        }
    }

    /// Whether the fixed-window timer can be torn down: no outstanding
    /// admissions counted and nothing currently running.
    pub fn window_timer_clearable(&self, pending: usize) -> bool {
        !self.strict && self.fixed.interval_count == 0 && pending == 0
    }

    /// Observable "is another admission blocked right now" used to derive
    /// `is_rate_limited`. Unlike `check`, this never mutates state -- it's
    /// safe to call from a read-only recompute-and-compare pass.
    pub fn would_block(&self, now: Instant) -> bool {
        if self.is_ignored() {
            return false;
        }
        if self.strict {
            let live = self.strict_ticks.live();
            let still_live = live
                .iter()
                .filter(|tick| now.saturating_duration_since(**tick) < self.interval)
                .count();
            still_live >= self.cap_value()
        } else if self.fixed.interval_end.is_some_and(|end| end > now) {
            self.fixed.interval_count >= self.cap_value()
        } else if let Some(last) = self.fixed.last_execution_time {
            now.saturating_duration_since(last) < self.interval
        } else {
            false
        }
    }

    /// Drop all strict-mode history and reset the fixed-window counters.
    /// Called when the queue becomes fully idle, to release memory that a
    /// long session's ticks would otherwise retain.
    pub fn compact_idle(&mut self) {
        self.strict_ticks.maybe_compact();
    }
}
