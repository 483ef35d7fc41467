//! Explicit Congestion Notification rewriting.
//!
//! Setting Congestion Experienced follows the rules routers apply (RFC 3168): only packets that
//! advertise an ECN-capable transport are marked, and a Not-ECT packet is left alone. The IPv4
//! header checksum is recomputed after the rewrite.

use pnet::packet::{
    ethernet::{EtherTypes, EthernetPacket},
    ipv4::{self, MutableIpv4Packet},
    ipv6::MutableIpv6Packet,
};

use crate::{Error, Result, ETH_HLEN};

const IPV4_MIN_HLEN: usize = 20;
const IPV6_HLEN: usize = 40;
const ECN_MASK: u8 = 0b11;

/// The two-bit ECN field of an IP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codepoint {
    /// Not ECN-capable transport.
    NotEct,
    /// ECN-capable transport, ECT(1).
    Ect1,
    /// ECN-capable transport, ECT(0).
    Ect0,
    /// Congestion Experienced.
    Ce,
}

impl Codepoint {
    /// Decodes the two low bits of `bits`.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & ECN_MASK {
            0b00 => Self::NotEct,
            0b01 => Self::Ect1,
            0b10 => Self::Ect0,
            _ => Self::Ce,
        }
    }

    /// The two-bit wire encoding.
    pub const fn bits(self) -> u8 {
        match self {
            Self::NotEct => 0b00,
            Self::Ect1 => 0b01,
            Self::Ect0 => 0b10,
            Self::Ce => 0b11,
        }
    }
}

/// Outcome of [`set_ce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marking {
    /// The header was rewritten from ECT(0) or ECT(1) to CE.
    Marked,
    /// The packet already carried CE.
    AlreadyMarked,
    /// The packet is IP but not ECN-capable.
    NotCapable,
    /// The frame does not carry IPv4 or IPv6.
    NotIp,
}

impl Marking {
    /// Whether the packet carries CE after the call.
    pub const fn is_ce(self) -> bool {
        matches!(self, Self::Marked | Self::AlreadyMarked)
    }
}

/// Sets the ECN field of the IP packet inside an Ethernet frame to Congestion Experienced.
pub fn set_ce(frame: &mut [u8]) -> Result<Marking> {
    let len = frame.len();
    let ethertype = EthernetPacket::new(frame)
        .ok_or(Error::Truncated { needed: ETH_HLEN, len })?
        .get_ethertype();

    let payload = &mut frame[ETH_HLEN..];

    match ethertype {
        EtherTypes::Ipv4 => set_ce_v4(payload, len),
        EtherTypes::Ipv6 => set_ce_v6(payload, len),
        _ => Ok(Marking::NotIp),
    }
}

fn set_ce_v4(payload: &mut [u8], frame_len: usize) -> Result<Marking> {
    let truncated = Error::Truncated { needed: ETH_HLEN + IPV4_MIN_HLEN, len: frame_len };
    let mut ip = MutableIpv4Packet::new(payload).ok_or(truncated)?;

    // The checksum covers the full header, options included.
    let hlen = ip.get_header_length() as usize * 4;
    if hlen < IPV4_MIN_HLEN {
        return Err(truncated);
    }
    if ETH_HLEN + hlen > frame_len {
        return Err(Error::Truncated { needed: ETH_HLEN + hlen, len: frame_len });
    }

    let marking = mark(Codepoint::from_bits(ip.get_ecn()));
    if marking == Marking::Marked {
        ip.set_ecn(Codepoint::Ce.bits());
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }

    Ok(marking)
}

fn set_ce_v6(payload: &mut [u8], frame_len: usize) -> Result<Marking> {
    let mut ip = MutableIpv6Packet::new(payload)
        .ok_or(Error::Truncated { needed: ETH_HLEN + IPV6_HLEN, len: frame_len })?;

    let class = ip.get_traffic_class();
    let marking = mark(Codepoint::from_bits(class));
    if marking == Marking::Marked {
        ip.set_traffic_class(class | Codepoint::Ce.bits());
    }

    Ok(marking)
}

const fn mark(current: Codepoint) -> Marking {
    match current {
        Codepoint::NotEct => Marking::NotCapable,
        Codepoint::Ce => Marking::AlreadyMarked,
        Codepoint::Ect0 | Codepoint::Ect1 => Marking::Marked,
    }
}
