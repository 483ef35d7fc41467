//! Packets and the verdicts stages reach on them.

use std::fmt;

use bytes::BytesMut;

use crate::stage::StageIndex;

/// A frame travelling through the shaping stages, with the metadata the stages read and write.
#[derive(Debug, Clone)]
pub struct Packet {
    data: BytesMut,
    ifindex: u32,
    /// Earliest departure time in nanoseconds. 0 means unset.
    tstamp: u64,
    congestion_marked: bool,
}

impl Packet {
    /// Creates a packet seen on interface `ifindex` with no departure time.
    pub const fn new(data: BytesMut, ifindex: u32) -> Self {
        Self { data, ifindex, tstamp: 0, congestion_marked: false }
    }

    /// Creates a packet from a copy of `data`.
    pub fn from_slice(data: &[u8], ifindex: u32) -> Self {
        Self::new(BytesMut::from(data), ifindex)
    }

    /// Sets an initial departure time, e.g. one assigned by an earlier qdisc.
    pub fn with_tstamp(mut self, tstamp: u64) -> Self {
        self.tstamp = tstamp;
        self
    }

    /// Length of the frame on the wire in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-length frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The frame bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The frame bytes, for header rewrites.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The interface the packet was seen on.
    #[inline]
    pub const fn ifindex(&self) -> u32 {
        self.ifindex
    }

    /// Earliest departure time in nanoseconds, 0 if none has been assigned.
    #[inline]
    pub const fn tstamp(&self) -> u64 {
        self.tstamp
    }

    /// Sets the earliest departure time in nanoseconds.
    #[inline]
    pub fn set_tstamp(&mut self, tstamp: u64) {
        self.tstamp = tstamp;
    }

    /// Whether a stage signalled congestion for this packet.
    #[inline]
    pub const fn is_congestion_marked(&self) -> bool {
        self.congestion_marked
    }

    /// Signals congestion for this packet.
    #[inline]
    pub fn set_congestion_marked(&mut self) {
        self.congestion_marked = true;
    }

    /// The verdict for a packet that leaves the pipeline without being dropped.
    #[inline]
    pub const fn forward_verdict(&self) -> Verdict {
        if self.congestion_marked {
            Verdict::ForwardWithCongestionMark
        } else {
            Verdict::Forward
        }
    }

    /// Returns the frame bytes.
    pub fn into_data(self) -> BytesMut {
        self.data
    }
}

/// What happens to a packet after a stage has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Transmit at the packet's departure time.
    Forward,
    /// Transmit, with the congestion signal set.
    ForwardWithCongestionMark,
    /// Discard the packet.
    Drop(DropReason),
    /// Continue in the stage at the given slot of the stage table.
    Handoff(StageIndex),
}

impl Verdict {
    /// Returns `true` for [`Verdict::Drop`].
    #[inline]
    pub const fn is_drop(&self) -> bool {
        matches!(self, Self::Drop(_))
    }
}

/// Why a packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The link-layer header could not be read within the frame.
    Malformed,
    /// The flow's virtual queue is at or beyond the drop horizon.
    Horizon,
    /// The per-flow state could not be written.
    StateStore,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Malformed => "malformed frame",
            Self::Horizon => "beyond drop horizon",
            Self::StateStore => "flow state write failed",
        };
        f.write_str(reason)
    }
}
