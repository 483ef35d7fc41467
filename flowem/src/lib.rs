#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Per-flow network emulation.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use flowem::{admin, AddPolicy, Packet, Pipeline, PolicyTable, Shaper};
//!
//! let policies = Arc::new(PolicyTable::default());
//! let request = AddPolicy::new()
//!     .interface("eth0")
//!     .mac("02:42:ac:11:00:02")
//!     .tc_handle(0x10)
//!     .bandwidth_mbps(1)
//!     .delay_ms(20);
//! admin::add(&policies, &request).unwrap();
//!
//! let pipeline = Pipeline::reference(Arc::new(Shaper::new(policies)));
//! let mut pkt = Packet::from_slice(&[0u8; 1500], 2);
//! let verdict = pipeline.run(&mut pkt);
//! ```

pub use flowem_common::{time, BoundedMap, Clock, ManualClock, MapError, MonotonicClock, UpdateFlag};
pub use flowem_shaper::*;
pub use flowem_wire::{ecn, FlowKey, MacAddr};
