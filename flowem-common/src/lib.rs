#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Common building blocks shared by the flowem crates.

/// Time sources.
pub mod clock;
/// Bounded concurrent maps.
pub mod map;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use map::{BoundedMap, MapError, UpdateFlag};

/// Time unit conversions. All timestamps in flowem are nanoseconds.
pub mod time {
    /// Nanoseconds in a second.
    pub const NS_PER_SEC: u64 = 1_000_000_000;
    /// Nanoseconds in a millisecond.
    pub const NS_PER_MS: u64 = 1_000_000;
}

/// Shared defaults.
pub mod constants {
    /// Default number of entries for the policy table and the per-flow state store.
    pub const DEFAULT_TABLE_CAPACITY: usize = 65_535;
}
