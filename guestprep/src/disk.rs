//! Disk image identity.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk format of a guest image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    #[default]
    Raw,
    Qcow2,
}

impl DiskFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
        }
    }
}

/// A persistent guest disk owned by the caller.
///
/// guestprep never creates or deletes the image; it edits the filesystem
/// inside it and boots it transiently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskImage {
    pub path: PathBuf,
    #[serde(default)]
    pub format: DiskFormat,
    /// Free-form description copied into inventory documents.
    #[serde(default)]
    pub description: Option<String>,
}

impl DiskImage {
    pub fn new(path: impl Into<PathBuf>, format: DiskFormat) -> Self {
        Self {
            path: path.into(),
            format,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
