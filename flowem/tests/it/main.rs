//! End-to-end shaping scenarios across the flowem crates.

use std::sync::Arc;

use flowem::{FlowKey, FlowPolicy, MacAddr, ManualClock, PolicyTable, Shaper, ShaperOptions};

mod admin;
mod congestion;
mod pipeline;

/// An arbitrary point in time well clear of zero.
pub const T: u64 = 1_000_000_000_000;
pub const IFINDEX: u32 = 2;
pub const MAC: MacAddr = MacAddr(0x02, 0x42, 0xac, 0x11, 0x00, 0x02);

pub fn key() -> FlowKey {
    FlowKey::new(IFINDEX, MAC)
}

/// An Ethernet frame of `len` bytes sent by `mac`, with an empty payload of type IPv4.
pub fn frame_from(mac: MacAddr, len: usize) -> Vec<u8> {
    let mut frame = vec![0u8; len.max(14)];
    frame[6..12].copy_from_slice(&[mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]);
    frame[12..14].copy_from_slice(&[0x08, 0x00]);
    frame.truncate(len);
    frame
}

pub fn frame(len: usize) -> Vec<u8> {
    frame_from(MAC, len)
}

/// A shaper with `policy` installed for [`key`], driven by a manual clock starting at [`T`].
pub fn setup(policy: FlowPolicy) -> (Arc<Shaper>, Arc<ManualClock>) {
    setup_with(policy, ShaperOptions::default())
}

pub fn setup_with(policy: FlowPolicy, options: ShaperOptions) -> (Arc<Shaper>, Arc<ManualClock>) {
    let _ = tracing_subscriber::fmt::try_init();

    let policies = Arc::new(PolicyTable::new(16));
    policies.insert(key(), policy).unwrap();

    let clock = Arc::new(ManualClock::new(T));
    let shaper = Shaper::with_options(policies, clock.clone(), options).unwrap();
    (Arc::new(shaper), clock)
}
