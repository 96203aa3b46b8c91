//! Guest image preparation.
//!
//! Prepares disk images of installed operating systems without a human at
//! the console: temporary access is injected into the offline image, the
//! image is booted once on an ephemeral instance, commands run inside it,
//! and the image is returned with the temporary access removed.
//!
//! The entry point is [`Orchestrator`]. Its collaborators (hypervisor,
//! offline filesystem accessor, presence resolver, remote executor) live in
//! a [`PrepContext`] and can be replaced individually.

pub mod disk;
pub mod exec;
pub mod family;
pub mod fs;
pub mod instrument;
pub mod inventory;
pub mod lifecycle;
pub mod logging;
pub mod media;
pub mod net;
pub mod pipeline;
pub mod request;
pub mod runtime;
pub mod session;
pub mod util;
pub mod vmm;

#[cfg(test)]
pub(crate) mod testing;

pub use disk::{DiskFormat, DiskImage};
pub use family::{FamilyKind, GuestFamily};
pub use guestprep_shared::errors::{GuestprepError, GuestprepResult};
pub use inventory::{InventoryDocument, InventoryFormat};
pub use lifecycle::{Orchestrator, Phase};
pub use logging::init_logging_for;
pub use media::{MediaCustomizer, MediaOptions};
pub use request::{CustomizationRequest, FileSpec, Repository};
pub use runtime::{PrepContext, PrepOptions};
