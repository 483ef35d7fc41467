//! Per-flow pacing state.

use std::time::Duration;

use flowem_common::{constants::DEFAULT_TABLE_CAPACITY, BoundedMap, MapError, UpdateFlag};
use flowem_wire::FlowKey;

/// The pacing record of one flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowPacingState {
    /// Departure time assigned to the most recently scheduled packet of the flow.
    pub last_scheduled_send_ns: u64,
}

/// Flow → [`FlowPacingState`], written only by the pacing scheduler.
///
/// Entries live until they are removed, swept with [`FlowStateStore::evict_idle`], or the store
/// is cleared. Once the store is full, new flows cannot be recorded.
#[derive(Debug)]
pub struct FlowStateStore {
    map: BoundedMap<FlowKey, FlowPacingState>,
}

impl Default for FlowStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_CAPACITY)
    }
}

impl FlowStateStore {
    /// Creates an empty store that tracks at most `capacity` flows.
    pub fn new(capacity: usize) -> Self {
        Self { map: BoundedMap::with_capacity(capacity) }
    }

    /// The pacing record of `key`, if any.
    #[inline]
    pub fn get(&self, key: &FlowKey) -> Option<FlowPacingState> {
        self.map.lookup(key)
    }

    /// The last scheduled departure time of the flow, if it has one.
    #[inline]
    pub fn last_send(&self, key: &FlowKey) -> Option<u64> {
        self.get(key).map(|state| state.last_scheduled_send_ns)
    }

    /// Records `send_ns` as the flow's last scheduled departure time.
    #[inline]
    pub fn record(&self, key: FlowKey, send_ns: u64, flag: UpdateFlag) -> Result<(), MapError> {
        self.map.update(key, FlowPacingState { last_scheduled_send_ns: send_ns }, flag)
    }

    /// Forgets `key`, returning its record if present.
    pub fn remove(&self, key: &FlowKey) -> Option<FlowPacingState> {
        self.map.delete(key)
    }

    /// Forgets every flow. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.map.clear()
    }

    /// Removes flows whose last departure is more than `idle` before `now_ns`. Returns the
    /// number of flows removed.
    ///
    /// A removed flow has no backlog left, so the next packet on it would take the idle
    /// branch anyway. Sweeping only frees capacity.
    pub fn evict_idle(&self, now_ns: u64, idle: Duration) -> usize {
        let cutoff = now_ns.saturating_sub(idle.as_nanos() as u64);
        let evicted = self.map.retain(|_, state| state.last_scheduled_send_ns >= cutoff);

        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.map.len(), "evicted idle flows");
        }

        evicted
    }

    /// Number of tracked flows.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no flow is tracked.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of tracked flows.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.map.capacity()
    }
}
