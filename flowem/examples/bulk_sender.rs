//! Offers a flow three times its configured bandwidth and prints what the shaper does with it.

use std::sync::Arc;

use flowem::{
    admin, time::NS_PER_MS, AddPolicy, ManualClock, Packet, Pipeline, PolicyTable, Shaper,
    ShaperOptions, Verdict,
};

const IFINDEX: u32 = 2;
const MAC: &str = "02:42:ac:11:00:02";
const FRAME_LEN: usize = 1500;

fn frame() -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_LEN];
    frame[6..12].copy_from_slice(&[0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
    frame[12..14].copy_from_slice(&[0x08, 0x00]);
    frame
}

fn main() {
    tracing_subscriber::fmt::init();

    let policies = Arc::new(PolicyTable::default());
    let request =
        AddPolicy::new().interface(IFINDEX).mac(MAC).tc_handle(0x10).bandwidth_mbps(1).delay_ms(20);
    admin::add(&policies, &request).unwrap();
    println!("{}\n", admin::EntryTable(&admin::entries(&policies)));

    let clock = Arc::new(ManualClock::new(1_000 * 1_000 * NS_PER_MS));
    let shaper =
        Arc::new(Shaper::with_options(policies, clock.clone(), ShaperOptions::default()).unwrap());
    let pipeline = Pipeline::reference(Arc::clone(&shaper));

    // 1 MB/s cap, one 1500 byte frame every 500us: 3 MB/s offered for 3 seconds.
    for i in 0..6_000u64 {
        let now = clock.advance(500_000);
        let mut pkt = Packet::from_slice(&frame(), IFINDEX);

        let verdict = pipeline.run(&mut pkt);
        if i % 500 == 0 {
            let backlog_ms = pkt.tstamp().saturating_sub(now) as f64 / NS_PER_MS as f64;
            match verdict {
                Verdict::Drop(reason) => println!("#{i:<5} dropped: {reason}"),
                verdict => println!("#{i:<5} {verdict:?}, departs in {backlog_ms:.1}ms"),
            }
        }
    }

    println!("\n{:#?}", shaper.stats().snapshot());
}
