use std::sync::Arc;

use flowem::{
    ecn::{self, Codepoint},
    FlowPolicy, Packet, Pipeline, ShaperOptions, Verdict,
};
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};

use crate::{frame, setup, setup_with, IFINDEX};

/// 1500 bytes at this rate take 100ms to serialize.
const RATE: u32 = 15_000;

fn ect_frame() -> Vec<u8> {
    let mut frame = frame(1500);
    {
        let mut ip = MutableIpv4Packet::new(&mut frame[14..]).unwrap();
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_ecn(Codepoint::Ect1.bits());
        ip.set_total_length(1500 - 14);
        ip.set_ttl(64);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);
    }
    frame
}

fn ecn_of(pkt: &Packet) -> Codepoint {
    Codepoint::from_bits(Ipv4Packet::new(&pkt.data()[14..]).unwrap().get_ecn())
}

#[test]
fn backlog_past_ecn_horizon_is_marked() {
    let (shaper, _) = setup(FlowPolicy::throttled(RATE));
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    // Backlogs of 100ms..=400ms are paced silently, 500ms..=1900ms are marked, 2s drops.
    let verdicts: Vec<_> = (0..=20)
        .map(|_| {
            let mut pkt = Packet::from_slice(&ect_frame(), IFINDEX);
            (pipeline.run(&mut pkt), pkt)
        })
        .collect();

    for (i, (verdict, pkt)) in verdicts.iter().enumerate() {
        let expected = match i {
            0..=4 => Verdict::Forward,
            5..=19 => Verdict::ForwardWithCongestionMark,
            _ => Verdict::Drop(flowem::DropReason::Horizon),
        };
        assert_eq!(*verdict, expected, "packet {i}");

        if *verdict == Verdict::ForwardWithCongestionMark {
            assert_eq!(ecn_of(pkt), Codepoint::Ce);
            let ip = Ipv4Packet::new(&pkt.data()[14..]).unwrap();
            assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));
        } else {
            assert_eq!(ecn_of(pkt), Codepoint::Ect1);
        }
    }

    let stats = shaper.stats().snapshot();
    assert_eq!((stats.idle, stats.paced, stats.marked, stats.dropped()), (1, 19, 15, 1));
}

#[test]
fn marking_without_rewrite_keeps_the_frame() {
    let options = ShaperOptions::default().with_rewrite_ecn(false);
    let (shaper, _) = setup_with(FlowPolicy::throttled(RATE), options);
    let pipeline = Pipeline::reference(shaper);

    let mut last = None;
    for _ in 0..6 {
        let mut pkt = Packet::from_slice(&ect_frame(), IFINDEX);
        last = Some((pipeline.run(&mut pkt), pkt));
    }

    let (verdict, pkt) = last.unwrap();
    assert_eq!(verdict, Verdict::ForwardWithCongestionMark);
    assert_eq!(pkt.data(), &ect_frame()[..]);
}

#[test]
fn non_ip_frames_are_flagged_only() {
    let (shaper, _) = setup(FlowPolicy::throttled(RATE));
    let pipeline = Pipeline::reference(shaper);

    let mut arp = frame(1500);
    arp[12..14].copy_from_slice(&[0x08, 0x06]);
    assert_eq!(ecn::set_ce(&mut arp.clone()).unwrap(), ecn::Marking::NotIp);

    let mut last = None;
    for _ in 0..6 {
        let mut pkt = Packet::from_slice(&arp, IFINDEX);
        last = Some((pipeline.run(&mut pkt), pkt));
    }

    let (verdict, pkt) = last.unwrap();
    assert_eq!(verdict, Verdict::ForwardWithCongestionMark);
    assert!(pkt.is_congestion_marked());
    assert_eq!(pkt.data(), &arp[..]);
}
