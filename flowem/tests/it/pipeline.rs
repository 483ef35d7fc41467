use std::sync::Arc;

use flowem::{
    time::NS_PER_MS, DropReason, FlowPolicy, MacAddr, Packet, Pipeline, StageIndex, Verdict,
};

use crate::{frame, frame_from, key, setup, IFINDEX, T};

const MB_S: u32 = 1_000_000;

#[test]
fn first_packet_is_idle_second_is_paced() {
    let (shaper, clock) = setup(FlowPolicy::throttled(MB_S));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    let mut first = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut first), Verdict::Forward);
    assert_eq!(first.tstamp(), 0);
    assert_eq!(shaper.flows().last_send(&key()), Some(T));

    clock.set(T + 100);
    let mut second = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut second), Verdict::Forward);
    assert_eq!(second.tstamp(), T + 1_500_000);
    assert_eq!(shaper.flows().last_send(&key()), Some(T + 1_500_000));
}

#[test]
fn backlog_beyond_horizon_is_dropped() {
    let (shaper, _) = setup(FlowPolicy::throttled(MB_S));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    // Next departure 2.1s out.
    let last = T + 2_100_000_000 - 1_500_000;
    shaper.flows().record(key(), last, flowem::UpdateFlag::Any).unwrap();

    let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut pkt), Verdict::Drop(DropReason::Horizon));
    assert_eq!(shaper.flows().last_send(&key()), Some(last));
    assert_eq!(shaper.stats().snapshot().dropped_horizon, 1);
}

#[test]
fn unconfigured_flows_are_untouched() {
    let (shaper, _) = setup(FlowPolicy::throttled(MB_S).with_delay(10));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));
    let stranger = MacAddr::new(0x02, 0, 0, 0, 0, 0xff);

    for tstamp in [0, T - 5, T + 5] {
        let mut pkt = Packet::from_slice(&frame_from(stranger, 1500), IFINDEX).with_tstamp(tstamp);
        assert_eq!(pipeline.run(&mut pkt), Verdict::Forward);
        assert_eq!(pkt.tstamp(), tstamp);
        assert!(!pkt.is_congestion_marked());
    }

    assert!(shaper.flows().is_empty());
}

#[test]
fn delay_only_policy_reaches_the_delay_stage() {
    let (shaper, _) = setup(FlowPolicy::delayed(30));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
    let before = pkt.data().to_vec();
    assert_eq!(pipeline.run(&mut pkt), Verdict::Forward);

    assert_eq!(pkt.tstamp(), T + 30 * NS_PER_MS);
    assert_eq!(pkt.data(), &before[..]);
    assert!(shaper.flows().is_empty());

    let stats = shaper.stats().snapshot();
    assert_eq!((stats.passthrough, stats.delayed, stats.idle, stats.paced), (1, 1, 0, 0));
}

#[test]
fn rate_only_policy_reaches_the_throttle_stage() {
    let (shaper, clock) = setup(FlowPolicy::throttled(MB_S));
    let pipeline = Pipeline::delay_then_throttle(Arc::clone(&shaper));

    let mut first = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut first), Verdict::Forward);
    assert_eq!(shaper.flows().last_send(&key()), Some(T));

    clock.advance(100);
    let mut second = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut second), Verdict::Forward);
    assert_eq!(second.tstamp(), T + 1_500_000);
}

#[test]
fn runt_frames_are_dropped() {
    let (shaper, _) = setup(FlowPolicy::throttled(MB_S));
    let pipeline = Pipeline::reference(shaper);

    let mut pkt = Packet::from_slice(&frame(13), IFINDEX);
    assert_eq!(pipeline.run(&mut pkt), Verdict::Drop(DropReason::Malformed));
}

#[test]
fn delay_is_added_after_pacing() {
    let (shaper, clock) = setup(FlowPolicy::throttled(MB_S).with_delay(50));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    let mut first = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut first), Verdict::Forward);
    assert_eq!(first.tstamp(), T + 50 * NS_PER_MS);

    // Pacing state is recorded before the delay, so it is not inflated by it.
    assert_eq!(shaper.flows().last_send(&key()), Some(T));

    clock.advance(100);
    let mut second = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut second), Verdict::Forward);
    assert_eq!(second.tstamp(), T + 1_500_000 + 50 * NS_PER_MS);
}

#[test]
fn delay_first_ordering_paces_delayed_departures() {
    let (shaper, _) = setup(FlowPolicy::throttled(MB_S).with_delay(50));
    let pipeline = Pipeline::delay_then_throttle(Arc::clone(&shaper));

    let mut first = Packet::from_slice(&frame(1500), IFINDEX);
    assert_eq!(pipeline.run(&mut first), Verdict::Forward);

    // The delayed departure is the baseline, so the flow restarts from it.
    assert_eq!(first.tstamp(), T + 50 * NS_PER_MS);
    assert_eq!(shaper.flows().last_send(&key()), Some(T + 50 * NS_PER_MS));

    let mut second = Packet::from_slice(&frame(1500), IFINDEX);
    pipeline.run(&mut second);
    assert_eq!(second.tstamp(), T + 50 * NS_PER_MS + 1_500_000);
}

#[test]
fn handoff_slot_is_configurable() {
    let index = StageIndex::new(1).unwrap();
    let options = flowem::ShaperOptions::default().with_handoff_index(index);
    let (shaper, _) = crate::setup_with(FlowPolicy::throttled(MB_S).with_delay(5), options);

    let pipeline = Pipeline::reference(Arc::clone(&shaper));
    assert_eq!(pipeline.table().get(index).map(|s| s.name()), Some("delay"));
    assert!(pipeline.table().get(StageIndex::ZERO).is_none());

    let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
    pipeline.run(&mut pkt);
    assert_eq!(pkt.tstamp(), T + 5 * NS_PER_MS);
}

#[test]
fn sustained_overload_converges_to_the_rate() {
    let (shaper, clock) = setup(FlowPolicy::throttled(MB_S));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    // 3 MB/s offered for three seconds. The backlog reaches the horizon after one.
    let mut forwarded = 0u64;
    let mut last_departure = 0;
    for _ in 0..6_000 {
        clock.advance(500_000);
        let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
        if !pipeline.run(&mut pkt).is_drop() {
            forwarded += 1;
            assert!(pkt.tstamp() == 0 || pkt.tstamp() > last_departure);
            last_departure = last_departure.max(pkt.tstamp());
        }
    }

    let stats = shaper.stats().snapshot();
    assert_eq!(stats.paced + stats.idle, forwarded);
    assert!(stats.dropped_horizon > 0);

    // Nothing departs past the horizon, so at most (elapsed + horizon) worth of bytes is
    // forwarded.
    let horizon = shaper.options().horizon.as_nanos() as u64;
    assert!(last_departure < shaper.now_ns() + horizon);
    assert!(forwarded * 1500 <= 5 * u64::from(MB_S) + 1500);
    assert!(forwarded * 1500 >= 4 * u64::from(MB_S));
}
