//! Stages and their composition.
//!
//! A [`Pipeline`] starts every packet in its entry stage. A stage either reaches a final
//! verdict or hands the packet off to a slot of the [`StageTable`], and the pipeline keeps
//! following hand-offs until a verdict is reached. The reference wiring runs the throttle
//! stage first and hands off to the delay stage in slot 0:
//!
//! ```text
//!  packet ──▶ ThrottleStage ──Handoff(0)──▶ table[0]: DelayStage ──▶ Forward
//!                  │
//!                  └──▶ Drop / Forward (no policy)
//! ```
//!
//! A hand-off to an empty slot forwards the packet as it is.

use std::{fmt, sync::Arc};

use crate::{
    packet::{Packet, Verdict},
    shaper::Shaper,
};

/// Number of slots in a [`StageTable`].
pub const MAX_STAGES: usize = 2;

/// Maximum number of hand-offs a single packet may take through a pipeline.
pub const MAX_TAIL_CALLS: usize = 33;

/// A slot of a [`StageTable`]. Always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageIndex(u32);

impl StageIndex {
    /// The first slot.
    pub const ZERO: Self = Self(0);

    /// Returns the index, or `None` if it is outside the stage table.
    pub const fn new(index: u32) -> Option<Self> {
        if (index as usize) < MAX_STAGES {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The slot number.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A packet processing step.
pub trait Stage: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Processes `pkt` and decides what happens to it next.
    fn process(&self, pkt: &mut Packet) -> Verdict;
}

/// Rate caps packets, then hands off (tc main program equivalent).
#[derive(Debug, Clone)]
pub struct ThrottleStage {
    shaper: Arc<Shaper>,
    handoff: Option<StageIndex>,
}

impl ThrottleStage {
    /// Creates the stage, handing off to the slot configured in the shaper's options.
    pub fn new(shaper: Arc<Shaper>) -> Self {
        let handoff = Some(shaper.options().handoff_index);
        Self { shaper, handoff }
    }

    /// Sets the slot to hand off to after pacing. `None` forwards instead.
    pub fn with_handoff(mut self, handoff: Option<StageIndex>) -> Self {
        self.handoff = handoff;
        self
    }
}

impl Stage for ThrottleStage {
    fn name(&self) -> &'static str {
        "throttle"
    }

    fn process(&self, pkt: &mut Packet) -> Verdict {
        self.shaper.throttle(pkt, self.handoff)
    }
}

/// Adds fixed delay. Terminal unless given a hand-off slot.
#[derive(Debug, Clone)]
pub struct DelayStage {
    shaper: Arc<Shaper>,
    handoff: Option<StageIndex>,
}

impl DelayStage {
    /// Creates a terminal delay stage.
    pub fn new(shaper: Arc<Shaper>) -> Self {
        Self { shaper, handoff: None }
    }

    /// Sets the slot to hand off to after delaying. `None` forwards instead.
    pub fn with_handoff(mut self, handoff: Option<StageIndex>) -> Self {
        self.handoff = handoff;
        self
    }
}

impl Stage for DelayStage {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn process(&self, pkt: &mut Packet) -> Verdict {
        self.shaper.set_delay(pkt, self.handoff)
    }
}

/// Fixed-size table of hand-off targets.
#[derive(Default)]
pub struct StageTable {
    slots: [Option<Box<dyn Stage>>; MAX_STAGES],
}

impl StageTable {
    /// Places `stage` in slot `index`, returning the stage previously there.
    pub fn insert(&mut self, index: StageIndex, stage: Box<dyn Stage>) -> Option<Box<dyn Stage>> {
        self.slots[index.0 as usize].replace(stage)
    }

    /// Empties slot `index`, returning the stage that was there.
    pub fn remove(&mut self, index: StageIndex) -> Option<Box<dyn Stage>> {
        self.slots[index.0 as usize].take()
    }

    /// The stage in slot `index`, if any.
    #[inline]
    pub fn get(&self, index: StageIndex) -> Option<&dyn Stage> {
        self.slots[index.0 as usize].as_deref()
    }
}

impl fmt::Debug for StageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|slot| slot.as_ref().map(|s| s.name())))
            .finish()
    }
}

/// An entry stage plus the stage table its hand-offs resolve against.
pub struct Pipeline {
    entry: Box<dyn Stage>,
    table: StageTable,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("entry", &self.entry.name())
            .field("table", &self.table)
            .finish()
    }
}

impl Pipeline {
    /// Creates a pipeline starting at `entry` with an empty stage table.
    pub fn new(entry: Box<dyn Stage>) -> Self {
        Self { entry, table: StageTable::default() }
    }

    /// Throttle first, then the fixed delay in the slot the shaper hands off to.
    pub fn reference(shaper: Arc<Shaper>) -> Self {
        let index = shaper.options().handoff_index;
        Self::new(Box::new(ThrottleStage::new(Arc::clone(&shaper))))
            .with_stage(index, Box::new(DelayStage::new(shaper)))
    }

    /// Fixed delay first, then throttling in slot 0, which forwards when done.
    pub fn delay_then_throttle(shaper: Arc<Shaper>) -> Self {
        let delay = DelayStage::new(Arc::clone(&shaper)).with_handoff(Some(StageIndex::ZERO));
        Self::new(Box::new(delay))
            .with_stage(StageIndex::ZERO, Box::new(ThrottleStage::new(shaper).with_handoff(None)))
    }

    /// Places `stage` in slot `index`.
    pub fn with_stage(mut self, index: StageIndex, stage: Box<dyn Stage>) -> Self {
        self.table.insert(index, stage);
        self
    }

    /// The stage table.
    #[inline]
    pub fn table(&self) -> &StageTable {
        &self.table
    }

    /// The stage table, for replacing stages.
    #[inline]
    pub fn table_mut(&mut self) -> &mut StageTable {
        &mut self.table
    }

    /// Runs `pkt` through the pipeline and returns its final verdict. Never returns
    /// [`Verdict::Handoff`].
    pub fn run(&self, pkt: &mut Packet) -> Verdict {
        let mut verdict = self.entry.process(pkt);
        let mut hops = 0;

        while let Verdict::Handoff(index) = verdict {
            if hops == MAX_TAIL_CALLS {
                tracing::debug!(hops, "hand-off limit reached, forwarding");
                return pkt.forward_verdict();
            }
            hops += 1;

            let Some(stage) = self.table.get(index) else {
                tracing::trace!(%index, "empty stage slot, forwarding");
                return pkt.forward_verdict();
            };

            verdict = stage.process(pkt);
        }

        match verdict {
            Verdict::Forward => pkt.forward_verdict(),
            verdict => verdict,
        }
    }
}
