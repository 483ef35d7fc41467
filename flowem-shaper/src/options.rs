use std::time::Duration;

use flowem_common::constants::DEFAULT_TABLE_CAPACITY;

use crate::stage::StageIndex;

/// Default drop horizon: no flow may queue more than this much virtual backlog.
pub const DEFAULT_HORIZON: Duration = Duration::from_secs(2);
/// Default marking horizon: backlogs at or beyond this are signalled with ECN.
pub const DEFAULT_ECN_HORIZON: Duration = Duration::from_millis(500);

/// Invalid [`ShaperOptions`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Marking would start only after packets are already dropped.
    #[error("ecn horizon ({ecn:?}) must not exceed the drop horizon ({drop:?})")]
    EcnBeyondHorizon {
        /// The configured marking horizon.
        ecn: Duration,
        /// The configured drop horizon.
        drop: Duration,
    },
    /// The state store could not hold a single flow.
    #[error("state capacity must be non-zero")]
    ZeroStateCapacity,
}

/// Options for a [`Shaper`](crate::Shaper).
#[derive(Debug, Clone)]
pub struct ShaperOptions {
    /// Backlog at which packets are dropped instead of scheduled.
    pub horizon: Duration,
    /// Backlog at which scheduled packets are congestion marked.
    pub ecn_horizon: Duration,
    /// The stage-table slot the throttle stage hands off to after scheduling.
    pub handoff_index: StageIndex,
    /// Maximum number of flows with pacing state.
    pub state_capacity: usize,
    /// Also rewrite the IP ECN field when marking.
    pub rewrite_ecn: bool,
}

impl Default for ShaperOptions {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            ecn_horizon: DEFAULT_ECN_HORIZON,
            handoff_index: StageIndex::ZERO,
            state_capacity: DEFAULT_TABLE_CAPACITY,
            rewrite_ecn: true,
        }
    }
}

impl ShaperOptions {
    /// Sets the drop horizon.
    pub const fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }

    /// Sets the congestion marking horizon.
    pub const fn with_ecn_horizon(mut self, ecn_horizon: Duration) -> Self {
        self.ecn_horizon = ecn_horizon;
        self
    }

    /// Sets the slot the throttle stage hands off to.
    pub const fn with_handoff_index(mut self, index: StageIndex) -> Self {
        self.handoff_index = index;
        self
    }

    /// Sets the maximum number of flows with pacing state.
    pub const fn with_state_capacity(mut self, capacity: usize) -> Self {
        self.state_capacity = capacity;
        self
    }

    /// Enables or disables rewriting the IP ECN field of marked packets.
    pub const fn with_rewrite_ecn(mut self, rewrite: bool) -> Self {
        self.rewrite_ecn = rewrite;
        self
    }

    /// Checks that the options describe a usable shaper.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ecn_horizon > self.horizon {
            return Err(ConfigError::EcnBeyondHorizon { ecn: self.ecn_horizon, drop: self.horizon });
        }
        if self.state_capacity == 0 {
            return Err(ConfigError::ZeroStateCapacity);
        }
        Ok(())
    }
}
