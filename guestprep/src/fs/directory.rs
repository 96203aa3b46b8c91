//! Guest filesystem backed by a host directory.
//!
//! Used directly for unpacked root trees, and as the access layer for
//! images mounted by [`super::GuestmountProvider`].

use super::{GuestFs, GuestFsHandle, GuestFsProvider};
use crate::disk::DiskImage;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

const MAX_SYMLINK_HOPS: usize = 40;

/// [`GuestFs`] over a directory that holds the guest's `/`.
pub struct DirectoryGuestFs {
    root: PathBuf,
}

impl DirectoryGuestFs {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an absolute guest path to a host path below the root.
    ///
    /// Intermediate symlinks are followed inside the image, so an absolute
    /// link such as `/etc/rc.d -> /etc/init.d` never reaches the host's
    /// `/etc`. The final component is not followed.
    fn resolve(&self, path: &str) -> GuestprepResult<PathBuf> {
        let guest = Path::new(path);
        if !guest.is_absolute() {
            return Err(GuestprepError::Instrumentation(format!(
                "guest path must be absolute: {}",
                path
            )));
        }

        let mut pending: VecDeque<OsString> = VecDeque::new();
        for component in guest.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(part) => pending.push_back(part.to_os_string()),
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(GuestprepError::Instrumentation(format!(
                        "guest path escapes the image root: {}",
                        path
                    )));
                }
            }
        }

        let mut resolved: Vec<OsString> = Vec::new();
        let mut hops = 0;
        while let Some(part) = pending.pop_front() {
            if part == ".." {
                resolved.pop();
                continue;
            }
            if part == "." {
                continue;
            }
            resolved.push(part);
            if pending.is_empty() {
                break;
            }

            let host = self.host_path(&resolved);
            let is_link = std::fs::symlink_metadata(&host)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if !is_link {
                continue;
            }

            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return Err(GuestprepError::Instrumentation(format!(
                    "too many levels of symbolic links: {}",
                    path
                )));
            }
            let target = std::fs::read_link(&host).map_err(|e| fs_err("readlink", path, e))?;
            resolved.pop();
            if target.is_absolute() {
                resolved.clear();
            }
            for component in target.components().rev() {
                match component {
                    Component::Normal(part) => pending.push_front(part.to_os_string()),
                    Component::ParentDir => pending.push_front(OsString::from("..")),
                    _ => {}
                }
            }
        }

        Ok(self.host_path(&resolved))
    }

    fn host_path(&self, parts: &[OsString]) -> PathBuf {
        let mut host = self.root.clone();
        host.extend(parts);
        host
    }
}

fn fs_err(op: &str, path: &str, e: std::io::Error) -> GuestprepError {
    GuestprepError::Instrumentation(format!("{} {}: {}", op, path, e))
}

impl GuestFs for DirectoryGuestFs {
    fn exists(&self, path: &str) -> GuestprepResult<bool> {
        let host = self.resolve(path)?;
        match std::fs::symlink_metadata(&host) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(fs_err("stat", path, e)),
        }
    }

    fn list(&self, path: &str) -> GuestprepResult<Vec<String>> {
        let entries = std::fs::read_dir(self.resolve(path)?).map_err(|e| fs_err("list", path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| fs_err("list", path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, path: &str) -> GuestprepResult<Vec<u8>> {
        std::fs::read(self.resolve(path)?).map_err(|e| fs_err("read", path, e))
    }

    fn write(&self, path: &str, contents: &[u8]) -> GuestprepResult<()> {
        std::fs::write(self.resolve(path)?, contents).map_err(|e| fs_err("write", path, e))
    }

    fn rename(&self, from: &str, to: &str) -> GuestprepResult<()> {
        std::fs::rename(self.resolve(from)?, self.resolve(to)?)
            .map_err(|e| fs_err("rename", &format!("{} -> {}", from, to), e))
    }

    fn remove(&self, path: &str) -> GuestprepResult<()> {
        std::fs::remove_file(self.resolve(path)?).map_err(|e| fs_err("remove", path, e))
    }

    fn mkdir(&self, path: &str) -> GuestprepResult<()> {
        std::fs::create_dir(self.resolve(path)?).map_err(|e| fs_err("mkdir", path, e))
    }

    fn remove_dir(&self, path: &str) -> GuestprepResult<()> {
        std::fs::remove_dir(self.resolve(path)?).map_err(|e| fs_err("rmdir", path, e))
    }

    fn symlink(&self, target: &str, link: &str) -> GuestprepResult<()> {
        std::os::unix::fs::symlink(target, self.resolve(link)?)
            .map_err(|e| fs_err("symlink", link, e))
    }

    fn chmod(&self, mode: u32, path: &str) -> GuestprepResult<()> {
        std::fs::set_permissions(self.resolve(path)?, std::fs::Permissions::from_mode(mode))
            .map_err(|e| fs_err("chmod", path, e))
    }
}

/// Opens images whose path is an unpacked root directory.
#[derive(Debug, Default, Clone)]
pub struct DirectoryProvider;

impl GuestFsProvider for DirectoryProvider {
    fn open(&self, image: &DiskImage, _op_id: &str) -> GuestprepResult<GuestFsHandle> {
        if !image.path.is_dir() {
            return Err(GuestprepError::Instrumentation(format!(
                "image root is not a directory: {}",
                image.path.display()
            )));
        }
        Ok(GuestFsHandle::unmounted(Box::new(DirectoryGuestFs::new(
            image.path.clone(),
        ))))
    }
}
