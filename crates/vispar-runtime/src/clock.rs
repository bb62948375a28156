//! Time sources and the wake-up facility windows use for proactive expiry.
//!
//! A window never sleeps or spawns anything itself. It asks a [`Scheduler`]
//! to call it back at a deadline and receives that call later through
//! [`HybridWindow::on_wakeup`](crate::window::HybridWindow::on_wakeup). Every
//! request carries a [`WakeupToken`]; bumping the window's generation turns
//! all outstanding tokens into no-ops, which is how teardown and restore cancel
//! callbacks that are already in flight.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vispar_core::EventTime;

/// Source of the current time in milliseconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> EventTime;

    /// Tokio instant at which this clock is expected to read `at`.
    /// Deadlines in the past map to the present.
    fn instant_at(&self, at: EventTime) -> tokio::time::Instant {
        let ahead = at.saturating_sub(self.now()).max(0) as u64;
        tokio::time::Instant::now() + Duration::from_millis(ahead)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> EventTime {
        (**self).now()
    }

    fn instant_at(&self, at: EventTime) -> tokio::time::Instant {
        (**self).instant_at(at)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EventTime {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Used for replay and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: EventTime) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: EventTime) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) -> EventTime {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EventTime {
        self.now.load(Ordering::SeqCst)
    }
}

/// Milliseconds measured on tokio's monotonic clock from a fixed base.
///
/// Follows `tokio::time::pause`, so timer-driven expiry can be tested
/// without real sleeps.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    base: EventTime,
}

impl TokioClock {
    pub fn new(base: EventTime) -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base,
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> EventTime {
        self.base + self.origin.elapsed().as_millis() as EventTime
    }

    /// Exact: the instant is derived from the origin, not from `now`.
    fn instant_at(&self, at: EventTime) -> tokio::time::Instant {
        let offset = at.saturating_sub(self.base).max(0) as u64;
        self.origin + Duration::from_millis(offset)
    }
}

/// Identifies which incarnation of a window a wake-up was requested by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeupToken {
    pub generation: u64,
}

/// A request for exactly one future `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wakeup {
    pub at: EventTime,
    pub token: WakeupToken,
}

/// "Wake me at T": delivers one callback per request.
pub trait Scheduler: Send {
    fn notify_at(&mut self, wakeup: Wakeup);
}

/// Collects requests instead of acting on them.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    pub requests: Vec<Wakeup>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Wakeup> {
        self.requests.last().copied()
    }

    pub fn take(&mut self) -> Vec<Wakeup> {
        std::mem::take(&mut self.requests)
    }
}

impl Scheduler for RecordingScheduler {
    fn notify_at(&mut self, wakeup: Wakeup) {
        self.requests.push(wakeup);
    }
}

/// Drops every request. For callers that drive `tick` themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn notify_at(&mut self, _wakeup: Wakeup) {}
}
