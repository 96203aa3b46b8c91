//! Disk images mounted through libguestfs' `guestmount`.
//!
//! `guestmount -a <disk> -i --rw <mountpoint>` inspects the image, mounts
//! its filesystems in the right places and exposes them over FUSE. The
//! mount is released with `guestunmount`, which waits for the backing
//! appliance to flush.

use super::{DirectoryGuestFs, GuestFsHandle, GuestFsProvider, Unmount};
use crate::disk::DiskImage;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub struct GuestmountProvider {
    mounts_dir: PathBuf,
    guestmount: PathBuf,
    guestunmount: PathBuf,
}

impl GuestmountProvider {
    pub fn new(mounts_dir: PathBuf) -> Self {
        Self {
            mounts_dir,
            guestmount: PathBuf::from("guestmount"),
            guestunmount: PathBuf::from("guestunmount"),
        }
    }

    pub fn with_binaries(mut self, guestmount: PathBuf, guestunmount: PathBuf) -> Self {
        self.guestmount = guestmount;
        self.guestunmount = guestunmount;
        self
    }
}

impl GuestFsProvider for GuestmountProvider {
    fn open(&self, image: &DiskImage, op_id: &str) -> GuestprepResult<GuestFsHandle> {
        if !image.path.exists() {
            return Err(GuestprepError::Instrumentation(format!(
                "disk image does not exist: {}",
                image.path.display()
            )));
        }

        let target = self.mounts_dir.join(op_id);
        std::fs::create_dir_all(&target).map_err(|e| {
            GuestprepError::Instrumentation(format!(
                "Failed to create mount point {}: {}",
                target.display(),
                e
            ))
        })?;

        let output = Command::new(&self.guestmount)
            .args(guestmount_args(image, &target))
            .output()
            .map_err(|e| {
                let _ = std::fs::remove_dir(&target);
                GuestprepError::Instrumentation(format!(
                    "Failed to run {}: {}",
                    self.guestmount.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let _ = std::fs::remove_dir(&target);
            return Err(GuestprepError::Instrumentation(format!(
                "guestmount of {} failed ({}): {}",
                image.path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            image = %image.path.display(),
            mount_point = %target.display(),
            "Guest filesystem mounted"
        );

        Ok(GuestFsHandle::mounted(
            Box::new(DirectoryGuestFs::new(target.clone())),
            Box::new(GuestMount {
                target,
                guestunmount: self.guestunmount.clone(),
                mounted: true,
            }),
        ))
    }
}

struct GuestMount {
    target: PathBuf,
    guestunmount: PathBuf,
    mounted: bool,
}

impl Unmount for GuestMount {
    fn target(&self) -> &Path {
        &self.target
    }

    fn unmount(&mut self) -> GuestprepResult<()> {
        if !self.mounted {
            return Ok(());
        }
        self.mounted = false;

        let output = Command::new(&self.guestunmount)
            .arg(&self.target)
            .output()
            .map_err(|e| {
                GuestprepError::Instrumentation(format!(
                    "Failed to run {}: {}",
                    self.guestunmount.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(GuestprepError::Instrumentation(format!(
                "guestunmount of {} failed ({}): {}",
                self.target.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let _ = std::fs::remove_dir(&self.target);
        debug!(mount_point = %self.target.display(), "Guest filesystem unmounted");
        Ok(())
    }
}

fn guestmount_args(image: &DiskImage, target: &Path) -> Vec<String> {
    vec![
        "-a".to_string(),
        image.path.display().to_string(),
        format!("--format={}", image.format.as_str()),
        "-i".to_string(),
        "--rw".to_string(),
        target.display().to_string(),
    ]
}
