//! Policy administration: the operations a control plane performs on a [`PolicyTable`].

use std::{ffi::CString, fmt};

use flowem_common::MapError;
use flowem_wire::{FlowKey, MacAddr};

use crate::policy::{FlowPolicy, PolicyTable};

/// Bytes per second in one unit of the administrative bandwidth.
pub const BPS_PER_MBPS: u32 = 1_000_000;

/// Why an administrative operation failed.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// A required field of the request was not set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// The MAC address could not be parsed.
    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),
    /// No interface has the given name.
    #[error("interface {0:?} not found")]
    InterfaceNotFound(String),
    /// The bandwidth in bytes per second does not fit in 32 bits.
    #[error("bandwidth of {0} Mbps does not fit the policy record")]
    BandwidthOverflow(u32),
    /// Neither a rate cap nor a delay was requested.
    #[error("policy shapes nothing: bandwidth and delay are both zero")]
    NoShaping,
    /// The policy table refused the write.
    #[error("policy table error: {0}")]
    Map(#[from] MapError),
}

/// Result alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

/// A network interface, by index or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interface {
    /// An interface index.
    Index(u32),
    /// An interface name, resolved when the request is applied.
    Name(String),
}

impl Interface {
    /// Resolves the interface to its index.
    pub fn resolve(&self) -> Result<u32> {
        match self {
            Self::Index(index) => Ok(*index),
            Self::Name(name) => if_nametoindex(name),
        }
    }
}

impl From<u32> for Interface {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Interface {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

fn if_nametoindex(name: &str) -> Result<u32> {
    let not_found = || AdminError::InterfaceNotFound(name.to_string());

    let c_name = CString::new(name).map_err(|_| not_found())?;
    let index = unsafe { nix::libc::if_nametoindex(c_name.as_ptr()) };

    if index == 0 {
        return Err(not_found());
    }
    Ok(index)
}

/// Parses a colon separated MAC address.
pub fn parse_mac(mac: &str) -> Result<MacAddr> {
    mac.parse().map_err(|_| AdminError::InvalidMac(mac.to_string()))
}

/// Converts an administrative bandwidth in Mbps to the policy's bytes per second.
pub fn mbps_to_bytes_per_sec(mbps: u32) -> Result<u32> {
    mbps.checked_mul(BPS_PER_MBPS).ok_or(AdminError::BandwidthOverflow(mbps))
}

/// One row of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEntry {
    /// The flow the policy applies to.
    pub key: FlowKey,
    /// The installed policy.
    pub policy: FlowPolicy,
}

impl PolicyEntry {
    /// The configured bandwidth in Mbps.
    pub fn bandwidth_mbps(&self) -> f64 {
        f64::from(self.policy.throttle_rate_bps) / f64::from(BPS_PER_MBPS)
    }
}

/// A request to install a policy. Every field except the shaping parameters is required.
#[derive(Debug, Clone, Default)]
pub struct AddPolicy {
    interface: Option<Interface>,
    mac: Option<String>,
    tc_handle: Option<u32>,
    bandwidth_mbps: u32,
    delay_ms: u32,
}

impl AddPolicy {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interface, by index or by name.
    pub fn interface(mut self, interface: impl Into<Interface>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Sets the source MAC address, e.g. `02:42:ac:11:00:02`.
    pub fn mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    /// Sets the traffic control class handle. Must be non-zero.
    pub const fn tc_handle(mut self, tc_handle: u32) -> Self {
        self.tc_handle = Some(tc_handle);
        self
    }

    /// Rate cap in Mbps (10^6 bytes per second). 0 disables throttling.
    pub const fn bandwidth_mbps(mut self, mbps: u32) -> Self {
        self.bandwidth_mbps = mbps;
        self
    }

    /// Fixed delay in milliseconds. 0 disables delaying.
    pub const fn delay_ms(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Validates the request and resolves it into a table entry.
    pub fn resolve(&self) -> Result<PolicyEntry> {
        let interface = self.interface.as_ref().ok_or(AdminError::MissingField("interface"))?;
        let mac = self.mac.as_deref().ok_or(AdminError::MissingField("mac"))?;
        let tc_handle =
            self.tc_handle.filter(|h| *h != 0).ok_or(AdminError::MissingField("tc handle"))?;

        if self.bandwidth_mbps == 0 && self.delay_ms == 0 {
            return Err(AdminError::NoShaping);
        }

        let key = FlowKey::new(interface.resolve()?, parse_mac(mac)?);
        let policy = FlowPolicy {
            tc_handle,
            throttle_rate_bps: mbps_to_bytes_per_sec(self.bandwidth_mbps)?,
            delay_ms: self.delay_ms,
        };

        Ok(PolicyEntry { key, policy })
    }
}

/// Installs a policy, replacing any existing one for the same flow.
pub fn add(table: &PolicyTable, request: &AddPolicy) -> Result<PolicyEntry> {
    let entry = request.resolve()?;
    table.insert(entry.key, entry.policy)?;

    tracing::debug!(
        key = %entry.key,
        tc_handle = format_args!("{:#x}", entry.policy.tc_handle),
        bandwidth_mbps = entry.bandwidth_mbps(),
        delay_ms = entry.policy.delay_ms,
        "added policy"
    );

    Ok(entry)
}

/// Removes the policy of a flow. Returns the removed entry, if any.
pub fn remove(
    table: &PolicyTable,
    interface: &Interface,
    mac: &str,
) -> Result<Option<PolicyEntry>> {
    let key = FlowKey::new(interface.resolve()?, parse_mac(mac)?);
    let removed = table.remove(&key).map(|policy| PolicyEntry { key, policy });

    tracing::debug!(%key, removed = removed.is_some(), "removed policy");

    Ok(removed)
}

/// Removes every policy. Returns how many were removed.
pub fn clear(table: &PolicyTable) -> usize {
    let cleared = table.clear();
    tracing::debug!(cleared, "cleared policy table");
    cleared
}

/// All policies, ordered by interface then MAC.
pub fn entries(table: &PolicyTable) -> Vec<PolicyEntry> {
    table.entries().into_iter().map(|(key, policy)| PolicyEntry { key, policy }).collect()
}

/// Renders policy entries as a table, one row per flow.
#[derive(Debug, Clone, Copy)]
pub struct EntryTable<'a>(pub &'a [PolicyEntry]);

impl fmt::Display for EntryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:<18} {:<10} {:>16} {:>10}",
            "IFINDEX", "MAC", "TC HANDLE", "BANDWIDTH (Mbps)", "DELAY (ms)"
        )?;
        for entry in self.0 {
            writeln!(
                f,
                "{:<10} {:<18} {:<10} {:>16.2} {:>10}",
                entry.key.ifindex,
                entry.key.src_mac.to_string(),
                format!("{:#x}", entry.policy.tc_handle),
                entry.bandwidth_mbps(),
                entry.policy.delay_ms,
            )?;
        }
        write!(f, "total entries: {}", self.0.len())
    }
}
