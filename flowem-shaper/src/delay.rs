//! Fixed delay injection.

use flowem_common::time::NS_PER_MS;

/// Returns the departure time of a packet after adding `delay_ms` of fixed delay.
///
/// An unset departure time (0) is anchored at `now_ns`. A set one is pushed back by the delay,
/// so passing a packet through the injector twice delays it twice.
#[inline]
pub fn inject_delay(tstamp: u64, delay_ms: u32, now_ns: u64) -> u64 {
    let delay_ns = u64::from(delay_ms) * NS_PER_MS;

    if tstamp == 0 {
        now_ns.saturating_add(delay_ns)
    } else {
        tstamp.saturating_add(delay_ns)
    }
}
