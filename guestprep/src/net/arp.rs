//! Address lookup through the kernel's ARP table.

use super::NetworkPresence;
use crate::vmm::InstanceSpec;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::IpAddr;
use std::path::PathBuf;

const PROC_NET_ARP: &str = "/proc/net/arp";

/// `ATF_COM`: the entry has a resolved hardware address.
const ATF_COM: u32 = 0x2;

pub struct ArpTableResolver {
    table: PathBuf,
}

impl ArpTableResolver {
    pub fn new() -> Self {
        Self::with_table(PathBuf::from(PROC_NET_ARP))
    }

    pub fn with_table(table: PathBuf) -> Self {
        Self { table }
    }
}

impl Default for ArpTableResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl NetworkPresence for ArpTableResolver {
    async fn resolve(&self, spec: &InstanceSpec) -> GuestprepResult<Option<IpAddr>> {
        let table = tokio::fs::read_to_string(&self.table).await.map_err(|e| {
            GuestprepError::Internal(format!(
                "Failed to read ARP table {}: {}",
                self.table.display(),
                e
            ))
        })?;
        Ok(lookup(&table, &spec.nic.mac))
    }
}

/// Find the complete entry for `mac` in `/proc/net/arp` text.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.122.45   0x1         0x2         52:54:00:12:34:56     *        virbr0
/// ```
pub(crate) fn lookup(table: &str, mac: &str) -> Option<IpAddr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [ip, _hw_type, flags, hw_addr, ..] = fields.as_slice() else {
            return None;
        };
        let flags = u32::from_str_radix(flags.trim_start_matches("0x"), 16).ok()?;
        if flags & ATF_COM == 0 || !hw_addr.eq_ignore_ascii_case(mac) {
            return None;
        }
        ip.parse().ok()
    })
}
