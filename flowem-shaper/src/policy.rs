//! Per-flow shaping policies and the table that holds them.

use std::num::NonZeroU32;

use flowem_common::{constants::DEFAULT_TABLE_CAPACITY, BoundedMap, MapError, UpdateFlag};
use flowem_wire::FlowKey;

/// Shaping parameters configured for a flow.
///
/// A zero field disables that dimension of shaping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowPolicy {
    /// The traffic control class handle the flow was provisioned under.
    pub tc_handle: u32,
    /// Sustained rate cap in bytes per second.
    pub throttle_rate_bps: u32,
    /// Fixed one-way delay in milliseconds.
    pub delay_ms: u32,
}

impl FlowPolicy {
    /// A policy that only caps the rate.
    pub const fn throttled(throttle_rate_bps: u32) -> Self {
        Self { tc_handle: 0, throttle_rate_bps, delay_ms: 0 }
    }

    /// A policy that only delays.
    pub const fn delayed(delay_ms: u32) -> Self {
        Self { tc_handle: 0, throttle_rate_bps: 0, delay_ms }
    }

    /// Sets the traffic control class handle.
    pub const fn with_tc_handle(mut self, tc_handle: u32) -> Self {
        self.tc_handle = tc_handle;
        self
    }

    /// Sets the rate cap in bytes per second. 0 disables throttling.
    pub const fn with_throttle_rate(mut self, throttle_rate_bps: u32) -> Self {
        self.throttle_rate_bps = throttle_rate_bps;
        self
    }

    /// Sets the fixed delay in milliseconds. 0 disables delaying.
    pub const fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// The rate cap, if throttling is enabled.
    #[inline]
    pub const fn throttle_rate(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.throttle_rate_bps)
    }

    /// The fixed delay, if delaying is enabled.
    #[inline]
    pub const fn delay(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.delay_ms)
    }
}

/// The flow → policy mapping, populated by the control plane and read by the stages.
#[derive(Debug)]
pub struct PolicyTable {
    map: BoundedMap<FlowKey, FlowPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_CAPACITY)
    }
}

impl PolicyTable {
    /// Creates an empty table that holds at most `capacity` policies.
    pub fn new(capacity: usize) -> Self {
        Self { map: BoundedMap::with_capacity(capacity) }
    }

    /// The policy of `key`, if one is configured.
    #[inline]
    pub fn get(&self, key: &FlowKey) -> Option<FlowPolicy> {
        self.map.lookup(key)
    }

    /// Installs or replaces the policy for `key`.
    pub fn insert(&self, key: FlowKey, policy: FlowPolicy) -> Result<(), MapError> {
        self.map.update(key, policy, UpdateFlag::Any)
    }

    /// Removes the policy of `key`, returning it if present.
    pub fn remove(&self, key: &FlowKey) -> Option<FlowPolicy> {
        self.map.delete(key)
    }

    /// Removes all policies, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.map.clear()
    }

    /// All configured policies, sorted by flow key.
    pub fn entries(&self) -> Vec<(FlowKey, FlowPolicy)> {
        let mut entries = self.map.snapshot();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }

    /// Number of configured policies.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no policy is configured.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of policies.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.map.capacity()
    }
}
