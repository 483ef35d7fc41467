#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Link-layer parsing for flowem.
//!
//! Every accessor here is bounds-checked against the frame it is given: a frame that is too
//! short for the header being read yields [`Error::Truncated`] instead of a partial read.

/// Congestion Experienced marking.
pub mod ecn;
/// Flow identification.
pub mod flow;

pub use flow::FlowKey;
pub use pnet::util::MacAddr;

/// Length of an Ethernet II header (destination, source, ethertype).
pub const ETH_HLEN: usize = 14;

/// Link-layer parsing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The frame ends before the header being read.
    #[error("truncated frame: need {needed} bytes, have {len}")]
    Truncated {
        /// Bytes the header requires.
        needed: usize,
        /// Bytes the frame has.
        len: usize,
    },
}

/// Result alias for link-layer parsing.
pub type Result<T> = std::result::Result<T, Error>;
