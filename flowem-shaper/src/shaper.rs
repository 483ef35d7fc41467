//! The shaping context.

use std::sync::Arc;

use flowem_common::{Clock, MonotonicClock};
use flowem_wire::{ecn, FlowKey};

use crate::{
    delay::inject_delay,
    options::{ConfigError, ShaperOptions},
    pacing::{PacingOutcome, PacingScheduler},
    packet::{DropReason, Packet, Verdict},
    policy::PolicyTable,
    state::FlowStateStore,
    stage::StageIndex,
    stats::ShaperStats,
};

/// The shared context of the shaping stages: policies, per-flow state, clock and counters.
///
/// Both entry points are synchronous and non-blocking. They may be called concurrently from
/// any number of threads.
pub struct Shaper {
    policies: Arc<PolicyTable>,
    flows: FlowStateStore,
    scheduler: PacingScheduler,
    clock: Arc<dyn Clock>,
    stats: ShaperStats,
    options: ShaperOptions,
}

impl std::fmt::Debug for Shaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shaper")
            .field("policies", &self.policies.len())
            .field("flows", &self.flows.len())
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Shaper {
    /// Creates a shaper with default options, reading the system clock.
    pub fn new(policies: Arc<PolicyTable>) -> Self {
        Self::build(policies, Arc::new(MonotonicClock::new()), ShaperOptions::default())
    }

    /// Creates a shaper with the given clock and options.
    pub fn with_options(
        policies: Arc<PolicyTable>,
        clock: Arc<dyn Clock>,
        options: ShaperOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self::build(policies, clock, options))
    }

    fn build(policies: Arc<PolicyTable>, clock: Arc<dyn Clock>, options: ShaperOptions) -> Self {
        Self {
            policies,
            flows: FlowStateStore::new(options.state_capacity),
            scheduler: PacingScheduler::new(options.horizon, options.ecn_horizon),
            clock,
            stats: ShaperStats::default(),
            options,
        }
    }

    /// The policy table, shared with the control plane.
    #[inline]
    pub fn policies(&self) -> &Arc<PolicyTable> {
        &self.policies
    }

    /// The per-flow pacing state.
    #[inline]
    pub const fn flows(&self) -> &FlowStateStore {
        &self.flows
    }

    /// The shaping counters.
    #[inline]
    pub const fn stats(&self) -> &ShaperStats {
        &self.stats
    }

    /// The options the shaper was built with.
    #[inline]
    pub const fn options(&self) -> &ShaperOptions {
        &self.options
    }

    /// The shaper clock's current time in nanoseconds.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    fn flow_key(&self, pkt: &Packet) -> Result<FlowKey, Verdict> {
        FlowKey::from_frame(pkt.data(), pkt.ifindex()).map_err(|err| {
            tracing::debug!(ifindex = pkt.ifindex(), %err, "dropping malformed frame");
            self.stats.increment_dropped(DropReason::Malformed);
            Verdict::Drop(DropReason::Malformed)
        })
    }

    /// Paces `pkt` according to its flow's rate cap.
    ///
    /// Malformed frames are dropped. Flows without a policy are forwarded untouched. A policy
    /// without a rate cap leaves the packet and the flow state untouched but still hands the
    /// packet off, so later stages apply the rest of the policy. Otherwise the packet is
    /// scheduled and, unless dropped, handed off to `handoff` (or forwarded if `None`).
    pub fn throttle(&self, pkt: &mut Packet, handoff: Option<StageIndex>) -> Verdict {
        let key = match self.flow_key(pkt) {
            Ok(key) => key,
            Err(verdict) => return verdict,
        };

        let Some(policy) = self.policies.get(&key) else {
            self.stats.increment_passthrough();
            return pkt.forward_verdict();
        };

        let Some(rate) = policy.throttle_rate() else {
            self.stats.increment_passthrough();
            return Self::continue_with(pkt, handoff);
        };

        let now = self.clock.now_ns();
        let len = pkt.len() as u64;

        match self.scheduler.schedule(&self.flows, key, rate, len, pkt.tstamp(), now) {
            PacingOutcome::Idle { send_at } => {
                tracing::trace!(%key, send_at, "flow idle, no pacing delay owed");
                self.stats.increment_idle();
            }
            PacingOutcome::Paced { send_at, congestion_marked } => {
                tracing::trace!(
                    %key,
                    send_at,
                    backlog_ns = send_at - now,
                    congestion_marked,
                    "paced"
                );
                if congestion_marked {
                    self.mark_congestion(pkt);
                }
                pkt.set_tstamp(send_at);
                self.stats.increment_paced(congestion_marked);
            }
            PacingOutcome::Dropped(reason) => {
                tracing::debug!(%key, %reason, len, "dropping packet");
                self.stats.increment_dropped(reason);
                return Verdict::Drop(reason);
            }
        }

        Self::continue_with(pkt, handoff)
    }

    /// Applies its flow's fixed delay to `pkt`.
    ///
    /// Malformed frames are dropped. Flows without a policy are forwarded untouched. A policy
    /// without a delay leaves the packet untouched but still hands it off. Otherwise the delay
    /// is added to the packet's departure time and the packet is handed off to `handoff` (or
    /// forwarded if `None`).
    pub fn set_delay(&self, pkt: &mut Packet, handoff: Option<StageIndex>) -> Verdict {
        let key = match self.flow_key(pkt) {
            Ok(key) => key,
            Err(verdict) => return verdict,
        };

        let Some(policy) = self.policies.get(&key) else {
            self.stats.increment_passthrough();
            return pkt.forward_verdict();
        };

        let Some(delay_ms) = policy.delay() else {
            self.stats.increment_passthrough();
            return Self::continue_with(pkt, handoff);
        };

        let send_at = inject_delay(pkt.tstamp(), delay_ms.get(), self.clock.now_ns());
        tracing::trace!(%key, delay_ms = delay_ms.get(), send_at, "delayed");
        pkt.set_tstamp(send_at);
        self.stats.increment_delayed();

        Self::continue_with(pkt, handoff)
    }

    fn continue_with(pkt: &Packet, handoff: Option<StageIndex>) -> Verdict {
        handoff.map_or_else(|| pkt.forward_verdict(), Verdict::Handoff)
    }

    fn mark_congestion(&self, pkt: &mut Packet) {
        pkt.set_congestion_marked();

        if !self.options.rewrite_ecn {
            return;
        }

        match ecn::set_ce(pkt.data_mut()) {
            Ok(marking) => tracing::trace!(?marking, "set congestion experienced"),
            Err(err) => tracing::trace!(%err, "ip header not rewritable"),
        }
    }
}
