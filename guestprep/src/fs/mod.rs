//! Offline access to a powered-off guest's filesystem.
//!
//! A [`GuestFsProvider`] opens a [`DiskImage`] and returns a
//! [`GuestFsHandle`]; the handle exposes [`GuestFs`] operations on guest
//! paths and releases the underlying mount when dropped.
//!
//! Providers:
//! - [`DirectoryProvider`]: the image is an unpacked root directory
//! - [`GuestmountProvider`]: the image is a disk file mounted with `guestmount`

mod directory;
mod guestmount;
mod handle;

pub use directory::{DirectoryGuestFs, DirectoryProvider};
pub use guestmount::GuestmountProvider;
pub use handle::{GuestFsHandle, Unmount};

use crate::disk::DiskImage;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::path::Path;

/// Filesystem operations on guest paths.
///
/// All paths are absolute guest paths (`/etc/ssh/sshd_config`). `exists`
/// does not follow symlinks, so a dangling startup link still counts.
pub trait GuestFs: Send + Sync {
    fn exists(&self, path: &str) -> GuestprepResult<bool>;

    /// Sorted entry names of a directory.
    fn list(&self, path: &str) -> GuestprepResult<Vec<String>>;

    fn read(&self, path: &str) -> GuestprepResult<Vec<u8>>;

    fn read_to_string(&self, path: &str) -> GuestprepResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes)
            .map_err(|e| GuestprepError::Instrumentation(format!("{} is not UTF-8: {}", path, e)))
    }

    /// Create or truncate `path` with `contents`.
    fn write(&self, path: &str, contents: &[u8]) -> GuestprepResult<()>;

    /// Copy a host file into the guest.
    fn upload(&self, host_path: &Path, path: &str) -> GuestprepResult<()> {
        let contents = std::fs::read(host_path).map_err(|e| {
            GuestprepError::Instrumentation(format!(
                "failed to read {} for upload: {}",
                host_path.display(),
                e
            ))
        })?;
        self.write(path, &contents)
    }

    fn rename(&self, from: &str, to: &str) -> GuestprepResult<()>;

    /// Remove a file or symlink.
    fn remove(&self, path: &str) -> GuestprepResult<()>;

    fn mkdir(&self, path: &str) -> GuestprepResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &str) -> GuestprepResult<()>;

    /// Create `link` pointing at `target` (target is not resolved).
    fn symlink(&self, target: &str, link: &str) -> GuestprepResult<()>;

    fn chmod(&self, mode: u32, path: &str) -> GuestprepResult<()>;
}

/// Opens disk images for offline editing.
pub trait GuestFsProvider: Send + Sync {
    /// Open `image`. `op_id` names the per-operation mount point.
    fn open(&self, image: &DiskImage, op_id: &str) -> GuestprepResult<GuestFsHandle>;
}
