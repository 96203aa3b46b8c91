//! Configuration options for guestprep.

use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default home directory.
pub const HOME_ENV: &str = "GUESTPREP_HOME";

/// Top-level options, loadable from a JSON file. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepOptions {
    /// Root for logs, keys and mount points. Must be absolute.
    pub home_dir: PathBuf,
    pub timeouts: Timeouts,
    pub vm: VmOptions,
    pub access: AccessOptions,
    pub announce: AnnounceOptions,
    pub presence: PresenceBackend,
}

impl Default for PrepOptions {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            timeouts: Timeouts::default(),
            vm: VmOptions::default(),
            access: AccessOptions::default(),
            announce: AnnounceOptions::default(),
            presence: PresenceBackend::default(),
        }
    }
}

impl PrepOptions {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> GuestprepResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GuestprepError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let options: PrepOptions = serde_json::from_str(&raw).map_err(|e| {
            GuestprepError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        options.sanitize()?;
        Ok(options)
    }

    /// Reject option combinations that cannot work.
    pub fn sanitize(&self) -> GuestprepResult<()> {
        if !self.home_dir.is_absolute() {
            return Err(GuestprepError::Config(format!(
                "home_dir must be absolute path, got: {}",
                self.home_dir.display()
            )));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(GuestprepError::Config(
                "timeouts.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.vm.cpus == 0 || self.vm.memory_mib == 0 {
            return Err(GuestprepError::Config(
                "vm.cpus and vm.memory_mib must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Private key used for the remote channel, defaulting into the home dir.
    pub fn private_key_path(&self) -> PathBuf {
        self.access
            .private_key
            .clone()
            .unwrap_or_else(|| self.home_dir.join("keys").join("id_rsa-guestprep"))
    }
}

fn default_home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|home| home.join(".guestprep"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/guestprep"))
}

/// Deadlines for the bounded waits and the remote channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub boot_secs: u64,
    pub shutdown_secs: u64,
    /// Connect timeout for each remote command.
    pub command_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            boot_secs: 600,
            shutdown_secs: 90,
            command_secs: 10,
            poll_interval_ms: 1000,
        }
    }
}

impl Timeouts {
    pub fn boot(&self) -> Duration {
        Duration::from_secs(self.boot_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Virtual hardware for ephemeral instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Hypervisor binary; looked up on PATH when unset.
    pub hypervisor_binary: Option<PathBuf>,
    pub memory_mib: u32,
    pub cpus: u8,
    /// Host bridge the guest NIC is attached to.
    pub bridge: String,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            hypervisor_binary: None,
            memory_mib: 1024,
            cpus: 1,
            bridge: "virbr0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessOptions {
    /// Private key for the remote channel; the public half is `<key>.pub`.
    pub private_key: Option<PathBuf>,
    pub user: String,
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            private_key: None,
            user: "root".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceOptions {
    /// Host address the guest announces itself to (the bridge address).
    pub host_ip: Ipv4Addr,
    /// Listener port; 0 picks an ephemeral port.
    pub port: u16,
    /// Announce helper uploaded into the image; looked up on PATH when unset.
    pub helper_binary: Option<PathBuf>,
}

impl Default for AnnounceOptions {
    fn default() -> Self {
        Self {
            host_ip: Ipv4Addr::new(192, 168, 122, 1),
            port: 0,
            helper_binary: None,
        }
    }
}

/// How the guest's address is discovered while waiting for boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceBackend {
    Arp,
    Announce,
    #[default]
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let mut options = PrepOptions::default();
        options.home_dir = PathBuf::from("/tmp/guestprep-test");
        options.sanitize().unwrap();
        assert_eq!(options.timeouts.command(), Duration::from_secs(10));
        assert_eq!(options.presence, PresenceBackend::Both);
        assert_eq!(
            options.private_key_path(),
            PathBuf::from("/tmp/guestprep-test/keys/id_rsa-guestprep")
        );
    }

    #[test]
    fn test_relative_home_rejected() {
        let options = PrepOptions {
            home_dir: PathBuf::from("relative/home"),
            ..Default::default()
        };
        assert!(matches!(options.sanitize(), Err(GuestprepError::Config(_))));
    }

    #[test]
    fn test_load_partial_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guestprep.json");
        std::fs::write(
            &path,
            r#"{"home_dir": "/srv/guestprep", "timeouts": {"boot_secs": 30}, "presence": "arp"}"#,
        )
        .unwrap();

        let options = PrepOptions::load(&path).unwrap();
        assert_eq!(options.home_dir, PathBuf::from("/srv/guestprep"));
        assert_eq!(options.timeouts.boot(), Duration::from_secs(30));
        assert_eq!(options.timeouts.shutdown_secs, 90);
        assert_eq!(options.presence, PresenceBackend::Arp);
        assert_eq!(options.vm.bridge, "virbr0");
    }

    #[test]
    fn test_load_rejects_zero_poll_interval() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("guestprep.json");
        std::fs::write(
            &path,
            r#"{"home_dir": "/srv/guestprep", "timeouts": {"poll_interval_ms": 0}}"#,
        )
        .unwrap();
        assert!(PrepOptions::load(&path).is_err());
    }
}
