//! Collaborators shared by every operation.

use crate::exec::{RemoteExecutor, SshExecutor};
use crate::fs::{GuestFsProvider, GuestmountProvider};
use crate::logging::init_logging_for;
use crate::net::{AnnounceListener, ArpTableResolver, CompositeResolver, NetworkPresence};
use crate::runtime::constants::ANNOUNCE_HELPER;
use crate::runtime::layout::FilesystemLayout;
use crate::runtime::options::{PrepOptions, PresenceBackend};
use crate::util::find_binary;
use crate::vmm::controller::{QemuController, VmmController};
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

const QEMU_BINARY: &str = "qemu-system-x86_64";

/// Hypervisor, filesystem accessor, presence resolver and remote
/// executor, plus the options they were built from.
///
/// Cheap to clone; collaborators are shared.
#[derive(Clone)]
pub struct PrepContext {
    pub controller: Arc<dyn VmmController>,
    pub guest_fs: Arc<dyn GuestFsProvider>,
    pub presence: Arc<dyn NetworkPresence>,
    pub executor: Arc<dyn RemoteExecutor>,
    pub layout: FilesystemLayout,
    pub options: PrepOptions,
}

impl PrepContext {
    /// Build the real collaborators: QEMU, guestmount, ARP and/or
    /// announce listener, and ssh.
    ///
    /// Prepares the home directory and installs logging.
    pub async fn from_options(options: PrepOptions) -> GuestprepResult<Self> {
        options.sanitize()?;

        let layout = FilesystemLayout::new(options.home_dir.clone());
        layout.prepare().map_err(|e| {
            GuestprepError::Config(format!(
                "Failed to initialize home directory {}: {}",
                layout.home_dir().display(),
                e
            ))
        })?;
        init_logging_for(&layout)?;

        let hypervisor = match &options.vm.hypervisor_binary {
            Some(path) => path.clone(),
            None => find_binary(QEMU_BINARY)?,
        };
        let controller: Arc<dyn VmmController> = Arc::new(QemuController::new(hypervisor));
        let guest_fs: Arc<dyn GuestFsProvider> =
            Arc::new(GuestmountProvider::new(layout.mounts_dir()));
        let presence = build_presence(&options).await?;
        let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(
            options.private_key_path(),
            options.access.user.clone(),
        ));

        tracing::debug!(
            home = %layout.home_dir().display(),
            presence = ?options.presence,
            announce_port = ?presence.announce_port(),
            "Initialized guestprep context"
        );

        Ok(Self::with_collaborators(
            options, controller, guest_fs, presence, executor,
        ))
    }

    /// Assemble a context from caller-supplied collaborators.
    pub fn with_collaborators(
        options: PrepOptions,
        controller: Arc<dyn VmmController>,
        guest_fs: Arc<dyn GuestFsProvider>,
        presence: Arc<dyn NetworkPresence>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            controller,
            guest_fs,
            presence,
            executor,
            layout: FilesystemLayout::new(options.home_dir.clone()),
            options,
        }
    }

    /// Public half of the remote channel key pair.
    pub fn public_key_path(&self) -> PathBuf {
        let mut path = self.options.private_key_path().into_os_string();
        path.push(".pub");
        PathBuf::from(path)
    }

    /// Host copy of the announce helper uploaded into images.
    pub fn announce_helper(&self) -> GuestprepResult<PathBuf> {
        match &self.options.announce.helper_binary {
            Some(path) => Ok(path.clone()),
            None => find_binary(ANNOUNCE_HELPER),
        }
    }

    /// Port the guest announces to: the live listener's, else the
    /// configured one.
    pub fn announce_port(&self) -> u16 {
        self.presence
            .announce_port()
            .unwrap_or(self.options.announce.port)
    }
}

async fn build_presence(options: &PrepOptions) -> GuestprepResult<Arc<dyn NetworkPresence>> {
    let listen = SocketAddr::new(IpAddr::V4(options.announce.host_ip), options.announce.port);
    let presence: Arc<dyn NetworkPresence> = match options.presence {
        PresenceBackend::Arp => Arc::new(ArpTableResolver::new()),
        PresenceBackend::Announce => Arc::new(AnnounceListener::bind(listen).await?),
        PresenceBackend::Both => Arc::new(CompositeResolver::new(vec![
            Box::new(AnnounceListener::bind(listen).await?),
            Box::new(ArpTableResolver::new()),
        ])),
    };
    Ok(presence)
}
