//! Listener for guest announcements.
//!
//! The announce helper installed in the guest connects once a minute and
//! sends its instance UUID followed by a newline. The peer address of that
//! connection is the guest's address.

use super::NetworkPresence;
use crate::vmm::InstanceSpec;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest line accepted from a guest.
const MAX_ANNOUNCE_LEN: u64 = 128;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

type Announcements = Arc<Mutex<HashMap<Uuid, IpAddr>>>;

pub struct AnnounceListener {
    local_addr: SocketAddr,
    seen: Announcements,
    accept_task: JoinHandle<()>,
}

impl AnnounceListener {
    /// Bind and start accepting. Port 0 picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> GuestprepResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GuestprepError::Config(format!("Failed to bind announce listener on {}: {}", addr, e))
        })?;
        let local_addr = listener.local_addr()?;
        let seen: Announcements = Arc::new(Mutex::new(HashMap::new()));

        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&seen)));
        debug!(addr = %local_addr, "Announce listener started");

        Ok(Self {
            local_addr,
            seen,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn announced(&self, uuid: &Uuid) -> Option<IpAddr> {
        self.seen.lock().get(uuid).copied()
    }
}

impl Drop for AnnounceListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[async_trait::async_trait]
impl NetworkPresence for AnnounceListener {
    async fn resolve(&self, spec: &InstanceSpec) -> GuestprepResult<Option<IpAddr>> {
        Ok(self.announced(&spec.uuid))
    }

    fn announce_port(&self) -> Option<u16> {
        Some(self.local_addr.port())
    }

    fn forget(&self, spec: &InstanceSpec) {
        self.seen.lock().remove(&spec.uuid);
    }
}

async fn accept_loop(listener: TcpListener, seen: Announcements) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    match tokio::time::timeout(READ_TIMEOUT, read_announcement(stream)).await {
                        Ok(Some(uuid)) => {
                            debug!(uuid = %uuid, peer = %peer.ip(), "Guest announced itself");
                            seen.lock().insert(uuid, peer.ip());
                        }
                        Ok(None) => debug!(peer = %peer, "Ignoring malformed announcement"),
                        Err(_) => debug!(peer = %peer, "Announcement timed out"),
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "Announce listener accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn read_announcement(stream: TcpStream) -> Option<Uuid> {
    let mut reader = BufReader::new(stream.take(MAX_ANNOUNCE_LEN));
    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;
    Uuid::parse_str(line.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncWriteExt;

    async fn announce(port: u16, payload: &str) {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        stream.write_all(payload.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    async fn wait_for(listener: &AnnounceListener, uuid: &Uuid) -> Option<IpAddr> {
        for _ in 0..100 {
            if let Some(ip) = listener.announced(uuid) {
                return Some(ip);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_records_announcing_peer() {
        let listener = AnnounceListener::bind((Ipv4Addr::LOCALHOST, 0).into())
            .await
            .unwrap();
        let port = listener.announce_port().unwrap();
        assert_ne!(port, 0);

        let uuid = Uuid::new_v4();
        announce(port, &format!("{}\n", uuid)).await;

        assert_eq!(
            wait_for(&listener, &uuid).await,
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST))
        );
    }

    #[tokio::test]
    async fn test_ignores_garbage() {
        let listener = AnnounceListener::bind((Ipv4Addr::LOCALHOST, 0).into())
            .await
            .unwrap();
        announce(listener.local_addr().port(), "not-a-uuid\n").await;

        let uuid = Uuid::new_v4();
        announce(listener.local_addr().port(), &format!("{}\n", uuid)).await;
        assert!(wait_for(&listener, &uuid).await.is_some());
        assert_eq!(listener.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_forget_drops_announcement() {
        use crate::disk::{DiskFormat, DiskImage};
        use crate::vmm::DiskBus;

        let listener = AnnounceListener::bind((Ipv4Addr::LOCALHOST, 0).into())
            .await
            .unwrap();
        let spec = InstanceSpec::new(
            DiskImage::new("/images/a.qcow2", DiskFormat::Qcow2),
            DiskBus::Virtio,
            "virtio-net-pci",
            "virbr0",
            512,
            1,
        );
        announce(listener.local_addr().port(), &format!("{}\n", spec.uuid)).await;
        assert!(wait_for(&listener, &spec.uuid).await.is_some());

        listener.forget(&spec);
        assert!(listener.seen.lock().is_empty());
        assert_eq!(listener.resolve(&spec).await.unwrap(), None);
    }
}
