//! Earliest-departure-time pacing.
//!
//! Each flow is a virtual queue draining at its configured rate. The queue is never
//! materialized: a flow's only state is the departure time of its last scheduled packet, and
//! the next packet departs one service time later. When that slot is already in the past the
//! queue has drained and the flow restarts from the current time.
//!
//! ```text
//!            now                     now + ecn_horizon          now + horizon
//!  ───────────┼──────────────────────────────┼──────────────────────────┼──────────▶ time
//!   next_ts   │   paced at next_ts           │  paced + congestion mark │  dropped
//!   <= base   │                              │                          │
//!   (idle)    │                              │                          │
//! ```
//!
//! The scheduler never waits. Delay is expressed by stamping the packet with a departure time
//! for the transmission layer to honour.

use std::{num::NonZeroU32, time::Duration};

use flowem_common::{time::NS_PER_SEC, UpdateFlag};
use flowem_wire::FlowKey;

use crate::{
    options::{DEFAULT_ECN_HORIZON, DEFAULT_HORIZON},
    packet::DropReason,
    state::FlowStateStore,
};

/// The scheduling decision for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingOutcome {
    /// The flow had no backlog. Its state was reset to `send_at` and the packet keeps its
    /// current departure time.
    Idle {
        /// The flow's new last departure time.
        send_at: u64,
    },
    /// The packet was queued behind the flow's backlog and must depart at `send_at`.
    Paced {
        /// The packet's departure time.
        send_at: u64,
        /// Whether the backlog reached the marking horizon.
        congestion_marked: bool,
    },
    /// The packet must be discarded. The flow state is unchanged.
    Dropped(DropReason),
}

/// Nanoseconds a packet of `len` bytes occupies a link running at `rate_bps` bytes per second.
#[inline]
pub fn service_time_ns(len: u64, rate_bps: NonZeroU32) -> u64 {
    len.saturating_mul(NS_PER_SEC) / u64::from(rate_bps.get())
}

/// Computes departure times from a flow's last scheduled departure.
#[derive(Debug, Clone, Copy)]
pub struct PacingScheduler {
    horizon_ns: u64,
    ecn_horizon_ns: u64,
}

impl Default for PacingScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON, DEFAULT_ECN_HORIZON)
    }
}

impl PacingScheduler {
    /// Creates a scheduler that drops at `horizon` of backlog and marks at `ecn_horizon`.
    pub fn new(horizon: Duration, ecn_horizon: Duration) -> Self {
        Self {
            horizon_ns: horizon.as_nanos() as u64,
            ecn_horizon_ns: ecn_horizon.as_nanos() as u64,
        }
    }

    /// Schedules a `len`-byte packet of flow `key`, currently stamped `tstamp` (0 if unset),
    /// at time `now_ns`, and commits the decision to `flows`.
    pub fn schedule(
        &self,
        flows: &FlowStateStore,
        key: FlowKey,
        rate_bps: NonZeroU32,
        len: u64,
        tstamp: u64,
        now_ns: u64,
    ) -> PacingOutcome {
        let outcome = self.plan(flows.last_send(&key), rate_bps, len, tstamp, now_ns);
        self.commit(flows, key, outcome)
    }

    /// Decides the fate of a packet given the flow's last scheduled departure `last`, without
    /// touching any state.
    pub fn plan(
        &self,
        last: Option<u64>,
        rate_bps: NonZeroU32,
        len: u64,
        tstamp: u64,
        now_ns: u64,
    ) -> PacingOutcome {
        let service_ns = service_time_ns(len, rate_bps);

        // 0 means "no history", which is always due.
        let next_ts = last.map_or(0, |last| last.saturating_add(service_ns));

        // Never schedule earlier than now, or than a delay already applied to the packet.
        let baseline = tstamp.max(now_ns);

        if next_ts <= baseline {
            return PacingOutcome::Idle { send_at: baseline };
        }

        // next_ts > baseline >= now_ns
        let backlog_ns = next_ts - now_ns;

        if backlog_ns >= self.horizon_ns {
            return PacingOutcome::Dropped(DropReason::Horizon);
        }

        let congestion_marked = backlog_ns >= self.ecn_horizon_ns;
        PacingOutcome::Paced { send_at: next_ts, congestion_marked }
    }

    /// Writes a planned `outcome` to `flows`.
    ///
    /// A write that fails turns the outcome into a drop: a packet is never forwarded with a
    /// departure time the store does not reflect. Backlog updates only overwrite an existing
    /// entry, so a flow removed since it was read is dropped for this packet rather than
    /// silently recreated.
    pub fn commit(
        &self,
        flows: &FlowStateStore,
        key: FlowKey,
        outcome: PacingOutcome,
    ) -> PacingOutcome {
        let (send_at, flag) = match outcome {
            PacingOutcome::Idle { send_at } => (send_at, UpdateFlag::Any),
            PacingOutcome::Paced { send_at, .. } => (send_at, UpdateFlag::Exist),
            PacingOutcome::Dropped(_) => return outcome,
        };

        if let Err(err) = flows.record(key, send_at, flag) {
            tracing::debug!(%key, ?err, ?flag, "failed to commit flow state");
            return PacingOutcome::Dropped(DropReason::StateStore);
        }

        outcome
    }
}
