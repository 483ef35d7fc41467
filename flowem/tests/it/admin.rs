use std::sync::Arc;

use flowem::{
    admin, AddPolicy, AdminError, FlowKey, Interface, MapError, Packet, Pipeline, PolicyTable,
    Shaper, ShaperOptions,
};

use crate::{frame, IFINDEX, MAC, T};

#[test]
fn policies_added_at_runtime_take_effect() {
    let _ = tracing_subscriber::fmt::try_init();

    let policies = Arc::new(PolicyTable::default());
    let clock = Arc::new(flowem::ManualClock::new(T));
    let shaper = Shaper::with_options(Arc::clone(&policies), clock, ShaperOptions::default());
    let shaper = Arc::new(shaper.unwrap());
    let pipeline = Pipeline::reference(shaper);

    let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
    pipeline.run(&mut pkt);
    assert_eq!(pkt.tstamp(), 0);

    let request =
        AddPolicy::new().interface(IFINDEX).mac(MAC.to_string()).tc_handle(0x10).delay_ms(30);
    let entry = admin::add(&policies, &request).unwrap();
    assert_eq!(entry.key, FlowKey::new(IFINDEX, MAC));

    let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
    pipeline.run(&mut pkt);
    assert_eq!(pkt.tstamp(), T + 30_000_000);

    let removed = admin::remove(&policies, &Interface::Index(IFINDEX), &MAC.to_string()).unwrap();
    assert_eq!(removed, Some(entry));

    let mut pkt = Packet::from_slice(&frame(1500), IFINDEX);
    pipeline.run(&mut pkt);
    assert_eq!(pkt.tstamp(), 0);
}

#[test]
fn listing_is_ordered_and_rendered() {
    let policies = PolicyTable::new(8);
    let rows = [
        (3u32, "02:00:00:00:00:02", 5),
        (1, "02:00:00:00:00:09", 1),
        (3, "02:00:00:00:00:01", 0),
    ];
    for (ifindex, mac, mbps) in rows {
        let request = AddPolicy::new()
            .interface(ifindex)
            .mac(mac)
            .tc_handle(0x1_0001)
            .bandwidth_mbps(mbps)
            .delay_ms(1);
        admin::add(&policies, &request).unwrap();
    }

    let entries = admin::entries(&policies);
    let order: Vec<_> = entries.iter().map(|e| e.key.to_string()).collect();
    assert_eq!(order, ["1/02:00:00:00:00:09", "3/02:00:00:00:00:01", "3/02:00:00:00:00:02"]);

    let rendered = admin::EntryTable(&entries).to_string();
    assert_eq!(rendered.lines().count(), 5);
    assert!(rendered.contains("0x10001"));
    assert!(rendered.contains("5.00"));

    assert_eq!(admin::clear(&policies), 3);
    assert_eq!(admin::EntryTable(&admin::entries(&policies)).to_string().lines().count(), 2);
}

#[test]
fn errors_name_the_problem() {
    let policies = PolicyTable::new(1);

    let request = AddPolicy::new().interface(1u32).tc_handle(1).delay_ms(1);
    let err = admin::add(&policies, &request).unwrap_err();
    assert_eq!(err.to_string(), "missing required field: mac");

    admin::add(&policies, &request.clone().mac("02:00:00:00:00:01")).unwrap();
    let err = admin::add(&policies, &request.mac("02:00:00:00:00:02")).unwrap_err();
    assert!(matches!(err, AdminError::Map(MapError::Full { capacity: 1 })));

    assert!(matches!(
        admin::remove(&policies, &Interface::Index(1), "not-a-mac"),
        Err(AdminError::InvalidMac(_))
    ));
}
