//! Hypervisor abstraction.
//!
//! An [`InstanceSpec`] is the declarative description of one ephemeral
//! instance. A [`controller::VmmController`] turns it into a running
//! instance and hands back a [`controller::VmmHandler`].

pub mod controller;

use crate::disk::DiskImage;
use crate::runtime::constants::INSTANCE_PREFIX;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Bus the guest disk is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    Virtio,
    Ide,
}

impl DiskBus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskBus::Virtio => "virtio",
            DiskBus::Ide => "ide",
        }
    }
}

/// Guest network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicSpec {
    /// Lower-case colon-separated MAC address.
    pub mac: String,
    /// Emulated device model (e.g. `virtio-net-pci`, `rtl8139`).
    pub model: String,
    pub bridge: String,
}

/// Declarative description of an ephemeral instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub uuid: Uuid,
    pub memory_mib: u32,
    pub cpus: u8,
    pub disk: DiskImage,
    pub disk_bus: DiskBus,
    pub nic: NicSpec,
    /// Serial console capture, if any.
    pub console_log: Option<PathBuf>,
}

impl InstanceSpec {
    /// Describe a fresh instance for `disk` with a random UUID and MAC.
    pub fn new(
        disk: DiskImage,
        disk_bus: DiskBus,
        nic_model: &str,
        bridge: &str,
        memory_mib: u32,
        cpus: u8,
    ) -> Self {
        let uuid = Uuid::new_v4();
        let short = uuid.simple().to_string();
        Self {
            name: format!("{}-{}", INSTANCE_PREFIX, &short[..12]),
            uuid,
            memory_mib,
            cpus,
            disk,
            disk_bus,
            nic: NicSpec {
                mac: random_mac(),
                model: nic_model.to_string(),
                bridge: bridge.to_string(),
            },
            console_log: None,
        }
    }

    pub fn with_console_log(mut self, path: PathBuf) -> Self {
        self.console_log = Some(path);
        self
    }
}

/// Random MAC in the locally administered QEMU range (52:54:00).
pub fn random_mac() -> String {
    let mut rng = rand::rng();
    let tail: [u8; 3] = rng.random();
    format!("52:54:00:{:02x}:{:02x}:{:02x}", tail[0], tail[1], tail[2])
}
