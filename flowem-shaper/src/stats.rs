//! Shaping counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::packet::DropReason;

/// Counters shared by all stages of a shaper. Updated with relaxed atomics on the packet path.
#[derive(Debug, Default)]
pub struct ShaperStats {
    /// Packets a stage left untouched: no policy for the flow, or the policy disables that stage.
    passthrough: AtomicU64,
    /// Packets that restarted an idle flow.
    idle: AtomicU64,
    /// Packets queued behind a flow's backlog.
    paced: AtomicU64,
    /// Paced packets that were congestion marked.
    marked: AtomicU64,
    /// Packets that received fixed delay.
    delayed: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_horizon: AtomicU64,
    dropped_state: AtomicU64,
}

/// A point-in-time copy of [`ShaperStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Packets a stage left untouched.
    pub passthrough: u64,
    /// Packets that restarted an idle flow.
    pub idle: u64,
    /// Packets queued behind a flow's backlog.
    pub paced: u64,
    /// Paced packets that were congestion marked.
    pub marked: u64,
    /// Packets that received fixed delay.
    pub delayed: u64,
    /// Drops for [`DropReason::Malformed`].
    pub dropped_malformed: u64,
    /// Drops for [`DropReason::Horizon`].
    pub dropped_horizon: u64,
    /// Drops for [`DropReason::StateStore`].
    pub dropped_state: u64,
}

impl StatsSnapshot {
    /// All drops.
    pub const fn dropped(&self) -> u64 {
        self.dropped_malformed + self.dropped_horizon + self.dropped_state
    }
}

impl ShaperStats {
    #[inline]
    pub(crate) fn increment_passthrough(&self) {
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_idle(&self) {
        self.idle.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_paced(&self, marked: bool) {
        self.paced.fetch_add(1, Ordering::Relaxed);
        if marked {
            self.marked.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn increment_delayed(&self) {
        self.delayed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::Malformed => &self.dropped_malformed,
            DropReason::Horizon => &self.dropped_horizon,
            DropReason::StateStore => &self.dropped_state,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passthrough: self.passthrough.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            paced: self.paced.load(Ordering::Relaxed),
            marked: self.marked.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_horizon: self.dropped_horizon.load(Ordering::Relaxed),
            dropped_state: self.dropped_state.load(Ordering::Relaxed),
        }
    }
}
