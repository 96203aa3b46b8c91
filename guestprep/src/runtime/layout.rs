//! On-disk layout of the guestprep home directory.

use guestprep_shared::errors::GuestprepResult;
use std::path::{Path, PathBuf};

/// Filesystem layout rooted at the guestprep home directory.
///
/// ```text
/// ~/.guestprep/
///   logs/      rolling log files
///   keys/      remote channel key pair
///   mounts/    per-operation mount points for offline edits
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.home_dir.join("keys")
    }

    pub fn mounts_dir(&self) -> PathBuf {
        self.home_dir.join("mounts")
    }

    /// Create all directories.
    pub fn prepare(&self) -> GuestprepResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.keys_dir())?;
        std::fs::create_dir_all(self.mounts_dir())?;
        Ok(())
    }
}
