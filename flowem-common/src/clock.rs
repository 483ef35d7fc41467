//! Nanosecond clocks used to stamp packet decisions.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Instant, SystemTime},
};

/// A source of "now" in nanoseconds.
///
/// Implementations must be cheap and non-blocking: the clock is read once per packet on the
/// shaping fast path.
pub trait Clock: Send + Sync {
    /// Returns the current time in nanoseconds. Never returns 0 for a running clock, since a
    /// zero timestamp means "unset" throughout flowem.
    fn now_ns(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// A monotonic clock anchored to the UNIX epoch at creation.
///
/// Readings advance with [`Instant`], so they never go backwards even if the system time is
/// adjusted after the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    origin_ns: u64,
}

impl MonotonicClock {
    /// Starts the clock at the current wall-clock time.
    pub fn new() -> Self {
        let origin_ns = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
            // Keep readings strictly positive even on a clock set before the epoch.
            .max(1);

        Self { origin: Instant::now(), origin_ns }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.origin_ns.saturating_add(self.origin.elapsed().as_nanos() as u64)
    }
}

/// A clock that only moves when told to. Used to drive deterministic scenarios.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock stopped at `now_ns`.
    pub const fn new(now_ns: u64) -> Self {
        Self { now: AtomicU64::new(now_ns) }
    }

    /// Sets the current time.
    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::Relaxed);
    }

    /// Moves the clock forward by `delta_ns` and returns the new time.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::Relaxed) + delta_ns
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
