//! Flow keys.

use std::fmt;

use pnet::packet::ethernet::EthernetPacket;
use pnet::util::MacAddr;

use crate::{Error, Result, ETH_HLEN};

/// Identifies a shaped flow: the interface a frame leaves through plus its source MAC.
///
/// Two frames with the same interface index and byte-identical source address belong to the
/// same flow. No normalization is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    /// The network interface index.
    pub ifindex: u32,
    /// The source hardware address.
    pub src_mac: MacAddr,
}

impl FlowKey {
    /// Creates a key for traffic from `src_mac` on interface `ifindex`.
    pub const fn new(ifindex: u32, src_mac: MacAddr) -> Self {
        Self { ifindex, src_mac }
    }

    /// Derives the flow key of an Ethernet frame seen on interface `ifindex`.
    ///
    /// Only the Ethernet header is parsed. Fails if the frame is shorter than [`ETH_HLEN`].
    pub fn from_frame(frame: &[u8], ifindex: u32) -> Result<Self> {
        let eth = EthernetPacket::new(frame)
            .ok_or(Error::Truncated { needed: ETH_HLEN, len: frame.len() })?;

        Ok(Self { ifindex, src_mac: eth.get_source() })
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ifindex, self.src_mac)
    }
}
