//! Discovering a booted guest's address.
//!
//! A [`NetworkPresence`] answers "has this instance shown up on the
//! network yet, and where?". The session polls it until an address
//! appears or the boot deadline passes.

mod announce;
mod arp;
mod composite;

pub use announce::AnnounceListener;
pub use arp::ArpTableResolver;
pub use composite::CompositeResolver;

use crate::vmm::InstanceSpec;
use guestprep_shared::errors::GuestprepResult;
use std::net::IpAddr;

#[async_trait::async_trait]
pub trait NetworkPresence: Send + Sync {
    /// One non-blocking poll. `None` means "not yet".
    async fn resolve(&self, spec: &InstanceSpec) -> GuestprepResult<Option<IpAddr>>;

    /// Port guests should announce themselves to, if this resolver
    /// listens for announcements.
    fn announce_port(&self) -> Option<u16> {
        None
    }

    /// Drop whatever was learned about `spec`; its instance is gone.
    fn forget(&self, _spec: &InstanceSpec) {}
}
