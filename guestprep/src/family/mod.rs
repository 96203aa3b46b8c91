//! Per-distribution behavior.
//!
//! A [`GuestFamily`] supplies everything that differs between operating
//! system families: service paths checked and installed during offline
//! instrumentation, the virtual hardware the guest expects, boot-media
//! text, and the package-manager command vocabulary used once the guest
//! is running. The orchestrator is written against the trait only.

mod redhat;
mod repos;
mod suse;

pub use redhat::RedHat;
pub use repos::ShippedRepository;
pub use suse::Suse;

use crate::request::Repository;
use crate::vmm::DiskBus;
use guestprep_shared::errors::GuestprepError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Known operating system families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyKind {
    Suse,
    RedHat,
}

impl FamilyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyKind::Suse => "suse",
            FamilyKind::RedHat => "redhat",
        }
    }
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FamilyKind {
    type Err = GuestprepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "suse" | "opensuse" => Ok(FamilyKind::Suse),
            "redhat" | "rhel" | "centos" => Ok(FamilyKind::RedHat),
            other => Err(GuestprepError::Config(format!(
                "unknown guest family: {}",
                other
            ))),
        }
    }
}

/// Init script and daemon binary that must exist before a service can be
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePaths {
    pub init_script: &'static str,
    pub daemon: &'static str,
}

impl ServicePaths {
    pub fn prerequisites(&self) -> [&'static str; 2] {
        [self.init_script, self.daemon]
    }
}

/// How a service is started at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEnablement {
    /// A script run late in boot.
    HookScript {
        path: &'static str,
        contents: &'static str,
    },
    /// A link in the default run level's startup directory pointing at
    /// the service's init script.
    StartupLink { name: &'static str },
}

/// `/etc/rc.d/rc<runlevel>.d/<name>`.
pub fn startup_link(runlevel: &str, name: &str) -> String {
    format!("/etc/rc.d/rc{}.d/{}", runlevel, name)
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Per-family strategy injected into the orchestrator.
pub trait GuestFamily: Send + Sync {
    fn kind(&self) -> FamilyKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    // Virtual hardware

    fn nic_model(&self) -> &'static str;

    fn disk_bus(&self) -> DiskBus;

    // Offline instrumentation

    fn sshd(&self) -> ServicePaths {
        ServicePaths {
            init_script: "/etc/init.d/sshd",
            daemon: "/usr/sbin/sshd",
        }
    }

    fn sshd_enablement(&self) -> ServiceEnablement;

    fn sshd_config(&self) -> &'static str;

    fn cron(&self) -> ServicePaths;

    /// Name of the cron startup link inside the run level directory.
    fn cron_link_name(&self) -> &'static str;

    // Boot media

    /// File name of the unattended-install answer file at the media root.
    fn answer_file_name(&self) -> &'static str;

    /// Boot-loader config path relative to the media root.
    fn isolinux_config(&self, arch: &str) -> String;

    /// Lines of the `customiso` boot stanza, without trailing newlines.
    fn boot_stanza(&self, install_url: Option<&str>) -> Vec<String>;

    // Running guest

    fn list_installed_command(&self) -> &'static str {
        "rpm -qa"
    }

    fn list_repositories_command(&self) -> &'static str;

    fn parse_repositories(&self, output: &str) -> Vec<ShippedRepository>;

    fn add_repository_command(&self, repo: &Repository) -> String;

    fn remove_repository_command(&self, repo: &ShippedRepository) -> String;

    /// One batched install for every package.
    fn install_command(&self, packages: &[String]) -> String;

    fn sync_command(&self) -> &'static str {
        "sync"
    }

    fn shutdown_command(&self) -> &'static str {
        "shutdown -h now"
    }

    /// URL schemes of installation media an ephemeral boot cannot reach.
    fn media_schemes(&self) -> &'static [&'static str] {
        &["cd", "dvd"]
    }
}

pub fn for_kind(kind: FamilyKind) -> Arc<dyn GuestFamily> {
    match kind {
        FamilyKind::Suse => Arc::new(Suse),
        FamilyKind::RedHat => Arc::new(RedHat),
    }
}
