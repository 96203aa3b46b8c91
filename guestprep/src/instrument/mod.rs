//! Offline instrumentation of a powered-off guest image.
//!
//! [`OfflineInstrumentor::setup`] injects three temporary artifacts, each
//! as an independently reversible step:
//!
//! 1. Access: the host's public key becomes root's `authorized_keys`.
//! 2. Service enablement: sshd is started at boot and configured for key
//!    login.
//! 3. Announcement: a cron job runs the announce helper every minute so
//!    the host learns the guest's address.
//!
//! [`OfflineInstrumentor::teardown`] reverses them in the opposite order.

pub mod edits;
mod runlevel;

pub use edits::{AppliedStep, InstrumentationState, InstrumentationStep, ReversibleEdit};
pub use runlevel::{default_runlevel, parse_default_runlevel};

use crate::family::{GuestFamily, ServiceEnablement, ServicePaths, startup_link};
use crate::fs::GuestFs;
use crate::runtime::constants::{HELPER_MODE, guest_paths};
use edits::EditRecorder;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the injected artifacts point at.
#[derive(Debug, Clone)]
pub struct InstrumentationTarget {
    /// Host public key installed as root's authorized keys.
    pub public_key: PathBuf,
    /// Host copy of the announce helper binary.
    pub announce_helper: PathBuf,
    pub host_ip: Ipv4Addr,
    pub port: u16,
    pub uuid: Uuid,
}

impl InstrumentationTarget {
    fn announce_job(&self) -> String {
        format!(
            "*/1 * * * * root /bin/bash -c \"{} {} {} {}\"\n",
            guest_paths::ANNOUNCE_HELPER,
            self.host_ip,
            self.port,
            self.uuid
        )
    }
}

pub struct OfflineInstrumentor {
    family: Arc<dyn GuestFamily>,
}

impl OfflineInstrumentor {
    pub fn new(family: Arc<dyn GuestFamily>) -> Self {
        Self { family }
    }

    /// Apply all three steps, or none.
    ///
    /// A failing step reverses its own recorded edits and then every
    /// completed step before the error is returned.
    pub fn setup(
        &self,
        fs: &dyn GuestFs,
        target: &InstrumentationTarget,
    ) -> GuestprepResult<InstrumentationState> {
        let start = Instant::now();
        let runlevel = default_runlevel(fs)?;
        debug!(runlevel = %runlevel, family = self.family.name(), "Instrumenting image");

        let mut state = InstrumentationState::default();
        for step in InstrumentationStep::ALL {
            let mut recorder = EditRecorder::new(fs);
            let result = match step {
                InstrumentationStep::Access => self.setup_access(&mut recorder, target),
                InstrumentationStep::ServiceEnablement => {
                    self.setup_service(&mut recorder, &runlevel)
                }
                InstrumentationStep::Announcement => {
                    self.setup_announcement(&mut recorder, target, &runlevel)
                }
            };

            let applied = AppliedStep {
                step,
                edits: recorder.into_edits(),
            };
            if let Err(e) = result {
                warn!(step = step.as_str(), error = %e, "Instrumentation step failed, rolling back");
                applied.reverse(fs);
                state.reverse(fs);
                return Err(e);
            }

            debug!(step = step.as_str(), edits = applied.edits.len(), "Instrumentation step applied");
            state.push(applied);
        }

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Image instrumented"
        );
        Ok(state)
    }

    /// Reverse `state` last step first. Errors are logged, never returned.
    pub fn teardown(&self, fs: &dyn GuestFs, state: &InstrumentationState) {
        let failures = state.reverse(fs);
        if failures > 0 {
            warn!(failures, "Instrumentation teardown left edits in place");
        } else {
            info!(steps = state.steps().len(), "Image uninstrumented");
        }
    }

    fn setup_access(
        &self,
        recorder: &mut EditRecorder<'_>,
        target: &InstrumentationTarget,
    ) -> GuestprepResult<()> {
        recorder.ensure_dir(guest_paths::ROOT_SSH_DIR)?;
        recorder.install_from_host(&target.public_key, guest_paths::AUTHORIZED_KEYS)
    }

    fn setup_service(&self, recorder: &mut EditRecorder<'_>, runlevel: &str) -> GuestprepResult<()> {
        let sshd = self.family.sshd();
        require(recorder.fs(), "sshd", &sshd)?;

        match self.family.sshd_enablement() {
            ServiceEnablement::HookScript { path, contents } => {
                recorder.install(path, contents.as_bytes())?;
                recorder.fs().chmod(HELPER_MODE, path)?;
            }
            ServiceEnablement::StartupLink { name } => {
                recorder.install_link(sshd.init_script, &startup_link(runlevel, name))?;
            }
        }

        recorder.install(guest_paths::SSHD_CONFIG, self.family.sshd_config().as_bytes())
    }

    fn setup_announcement(
        &self,
        recorder: &mut EditRecorder<'_>,
        target: &InstrumentationTarget,
        runlevel: &str,
    ) -> GuestprepResult<()> {
        let cron = self.family.cron();
        require(recorder.fs(), "cron", &cron)?;

        recorder.install_from_host(&target.announce_helper, guest_paths::ANNOUNCE_HELPER)?;
        recorder.fs().chmod(HELPER_MODE, guest_paths::ANNOUNCE_HELPER)?;

        recorder.ensure_dir(guest_paths::CRON_DIR)?;
        recorder.install(guest_paths::ANNOUNCE_CRON_JOB, target.announce_job().as_bytes())?;

        recorder.install_link(
            cron.init_script,
            &startup_link(runlevel, self.family.cron_link_name()),
        )
    }
}

fn require(fs: &dyn GuestFs, service: &str, paths: &ServicePaths) -> GuestprepResult<()> {
    for path in paths.prerequisites() {
        if !fs.exists(path)? {
            return Err(GuestprepError::PrerequisiteMissing(format!(
                "{} not installed on the image ({} missing)",
                service, path
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::{RedHat, Suse};
    use crate::fs::DirectoryGuestFs;
    use crate::testing::{GuestTree, snapshot};
    use tempfile::TempDir;

    struct Fixture {
        _host: TempDir,
        tree: GuestTree,
        target: InstrumentationTarget,
    }

    fn fixture() -> Fixture {
        let host = TempDir::new().unwrap();
        let public_key = host.path().join("id_rsa.pub");
        std::fs::write(&public_key, "ssh-rsa AAAA guestprep\n").unwrap();
        let helper = host.path().join("guestprep-announce");
        std::fs::write(&helper, "#!/bin/sh\n").unwrap();

        Fixture {
            _host: host,
            tree: GuestTree::suse(),
            target: InstrumentationTarget {
                public_key,
                announce_helper: helper,
                host_ip: Ipv4Addr::new(192, 168, 122, 1),
                port: 41000,
                uuid: Uuid::nil(),
            },
        }
    }

    fn instrumentor() -> OfflineInstrumentor {
        OfflineInstrumentor::new(Arc::new(Suse))
    }

    #[test]
    fn test_setup_installs_artifacts() {
        let f = fixture();
        let fs = f.tree.fs();
        let state = instrumentor().setup(&fs, &f.target).unwrap();

        assert_eq!(state.steps().len(), 3);
        assert_eq!(
            fs.read_to_string(guest_paths::AUTHORIZED_KEYS).unwrap(),
            "ssh-rsa AAAA guestprep\n"
        );
        assert_eq!(
            fs.read_to_string("/etc/init.d/after.local").unwrap(),
            "/sbin/service sshd start\n"
        );
        assert_eq!(
            fs.read_to_string(guest_paths::ANNOUNCE_CRON_JOB).unwrap(),
            "*/1 * * * * root /bin/bash -c \"/root/guestprep-announce 192.168.122.1 41000 00000000-0000-0000-0000-000000000000\"\n"
        );
        // GuestTree::suse() sets the default run level to 5.
        assert!(fs.exists("/etc/rc.d/rc5.d/S06cron").unwrap());
    }

    #[test]
    fn test_setup_then_teardown_restores_tree() {
        let f = fixture();
        let before = snapshot(f.tree.root());
        let fs = f.tree.fs();

        let instrumentor = instrumentor();
        let state = instrumentor.setup(&fs, &f.target).unwrap();
        assert_ne!(snapshot(f.tree.root()), before);

        instrumentor.teardown(&fs, &state);
        assert_eq!(snapshot(f.tree.root()), before);
    }

    #[test]
    fn test_existing_credentials_restored() {
        let f = fixture();
        let fs = f.tree.fs();
        fs.mkdir("/root/.ssh").unwrap();
        fs.write(guest_paths::AUTHORIZED_KEYS, b"ssh-ed25519 owner\n").unwrap();
        fs.write(guest_paths::SSHD_CONFIG, b"Port 2222\n").unwrap();
        fs.write("/etc/init.d/after.local", b"echo local\n").unwrap();
        fs.symlink("/etc/init.d/cron.old", "/etc/rc.d/rc5.d/S06cron").unwrap();
        let before = snapshot(f.tree.root());

        let instrumentor = instrumentor();
        let state = instrumentor.setup(&fs, &f.target).unwrap();
        assert!(fs.exists("/root/.ssh/authorized_keys.guestprep").unwrap());
        instrumentor.teardown(&fs, &state);

        assert_eq!(snapshot(f.tree.root()), before);
        assert_eq!(
            fs.read_to_string(guest_paths::AUTHORIZED_KEYS).unwrap(),
            "ssh-ed25519 owner\n"
        );
    }

    #[test]
    fn test_missing_sshd_undoes_access_only() {
        let f = fixture();
        let fs = f.tree.fs();
        fs.remove("/usr/sbin/sshd").unwrap();
        let before = snapshot(f.tree.root());

        let err = instrumentor().setup(&fs, &f.target).unwrap_err();
        assert!(err.is_prerequisite_missing());
        assert_eq!(snapshot(f.tree.root()), before);
    }

    #[test]
    fn test_missing_cron_undoes_everything() {
        let f = fixture();
        let fs = f.tree.fs();
        fs.remove("/etc/init.d/cron").unwrap();
        let before = snapshot(f.tree.root());

        let err = instrumentor().setup(&fs, &f.target).unwrap_err();
        assert!(err.is_prerequisite_missing());
        assert_eq!(snapshot(f.tree.root()), before);
    }

    #[test]
    fn test_failure_mid_step_leaves_nothing() {
        let f = fixture();
        let fs = f.tree.fs();
        let before = snapshot(f.tree.root());

        let mut target = f.target.clone();
        target.announce_helper = PathBuf::from("/nonexistent/helper");
        let err = instrumentor().setup(&fs, &target).unwrap_err();
        assert!(matches!(err, GuestprepError::Instrumentation(_)));
        assert_eq!(snapshot(f.tree.root()), before);
    }

    #[test]
    fn test_teardown_of_empty_state_is_noop() {
        let f = fixture();
        let before = snapshot(f.tree.root());
        let fs: DirectoryGuestFs = f.tree.fs();
        instrumentor().teardown(&fs, &InstrumentationState::default());
        assert_eq!(snapshot(f.tree.root()), before);
    }

    #[test]
    fn test_redhat_links_sshd_into_runlevel() {
        let f = fixture();
        let tree = GuestTree::redhat();
        let fs = tree.fs();
        let instrumentor = OfflineInstrumentor::new(Arc::new(RedHat));
        let before = snapshot(tree.root());

        let state = instrumentor.setup(&fs, &f.target).unwrap();
        assert!(fs.exists("/etc/rc.d/rc3.d/S55sshd").unwrap());
        assert!(fs.exists("/etc/rc.d/rc3.d/S90crond").unwrap());

        instrumentor.teardown(&fs, &state);
        assert_eq!(snapshot(tree.root()), before);
    }
}
