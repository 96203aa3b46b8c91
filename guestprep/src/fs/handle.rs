//! Guest filesystem handle with RAII release.

use super::GuestFs;
use guestprep_shared::errors::GuestprepResult;
use std::ops::Deref;
use std::path::Path;

/// Something mounted on the host that must be released after editing.
pub trait Unmount: Send + Sync {
    fn target(&self) -> &Path;
    fn unmount(&mut self) -> GuestprepResult<()>;
}

/// Open guest filesystem. Releases its mount on drop.
pub struct GuestFsHandle {
    fs: Box<dyn GuestFs>,
    mount: Option<Box<dyn Unmount>>,
}

impl GuestFsHandle {
    /// Handle without a mount to release.
    pub fn unmounted(fs: Box<dyn GuestFs>) -> Self {
        Self { fs, mount: None }
    }

    pub fn mounted(fs: Box<dyn GuestFs>, mount: Box<dyn Unmount>) -> Self {
        Self {
            fs,
            mount: Some(mount),
        }
    }

    /// Explicitly release. Called automatically on drop.
    pub fn release(mut self) -> GuestprepResult<()> {
        self.do_release()
    }

    fn do_release(&mut self) -> GuestprepResult<()> {
        let Some(mut mount) = self.mount.take() else {
            return Ok(());
        };
        mount.unmount().inspect_err(|e| {
            tracing::warn!(
                mount_point = %mount.target().display(),
                error = %e,
                "Failed to unmount guest filesystem"
            );
        })
    }
}

impl Deref for GuestFsHandle {
    type Target = dyn GuestFs;

    fn deref(&self) -> &Self::Target {
        self.fs.as_ref()
    }
}

impl Drop for GuestFsHandle {
    fn drop(&mut self) {
        let _ = self.do_release();
    }
}
