#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Per-flow traffic shaping.
//!
//! Flows are identified by the interface a packet arrives on and its source MAC address. A
//! [`PolicyTable`] maps flows to a rate cap and a fixed delay, and the two stages of a
//! [`Pipeline`] apply them: the throttle stage paces packets by stamping earliest departure
//! times, and the delay stage pushes those times further out. Nothing here queues or sleeps.
//! The resulting timestamp tells the transmission layer when a packet may leave.

/// Control-plane operations on the policy table.
pub mod admin;
/// Fixed delay injection.
pub mod delay;
/// Shaper configuration.
pub mod options;
/// Earliest-departure-time pacing.
pub mod pacing;
/// Packets and verdicts.
pub mod packet;
/// Per-flow shaping policies.
pub mod policy;
/// The shaping context shared by all stages.
pub mod shaper;
/// Stages, the stage table and pipelines.
pub mod stage;
/// Per-flow pacing state.
pub mod state;
/// Shaping counters.
pub mod stats;

pub use admin::{AddPolicy, AdminError, EntryTable, Interface, PolicyEntry};
pub use options::{ConfigError, ShaperOptions};
pub use pacing::{PacingOutcome, PacingScheduler};
pub use packet::{DropReason, Packet, Verdict};
pub use policy::{FlowPolicy, PolicyTable};
pub use shaper::Shaper;
pub use stage::{DelayStage, Pipeline, Stage, StageIndex, StageTable, ThrottleStage};
pub use state::{FlowPacingState, FlowStateStore};
pub use stats::{ShaperStats, StatsSnapshot};
