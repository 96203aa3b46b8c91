//! Hypervisor instance control.
//!
//! ## Architecture
//!
//! - **VmmController**: Spawning operations (creates VmmHandler)
//! - **VmmHandler**: Runtime operations on a running instance (destroy, state)
//!
//! The split keeps the session free of backend details: the session only
//! ever sees a handler, so tests substitute an in-memory one.

mod handler;
mod qemu;
mod spawn;

use crate::vmm::InstanceSpec;
use guestprep_shared::GuestprepResult;
pub use handler::VmmHandler;
pub use qemu::{QemuController, QemuHandler};

/// Trait for starting instances.
#[async_trait::async_trait]
pub trait VmmController: Send + Sync {
    /// Start a new instance and return a handler for runtime operations.
    ///
    /// Fails with `Hypervisor` when the backend rejects the description.
    async fn start(&self, spec: &InstanceSpec) -> GuestprepResult<Box<dyn VmmHandler>>;
}
