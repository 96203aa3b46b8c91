//! What a customization run should change inside the guest.

use serde::{Deserialize, Serialize};

/// Packages, files and repositories to apply to a guest.
///
/// Loaded from JSON by the command line; consumed read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomizationRequest {
    pub packages: Vec<String>,
    pub files: Vec<FileSpec>,
    pub repositories: Vec<Repository>,
}

impl CustomizationRequest {
    /// A request with no packages and no files needs no boot at all.
    /// Repositories alone do not count.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.files.is_empty()
    }

    /// Whether the guest's repository configuration must be consulted.
    pub fn touches_repositories(&self) -> bool {
        !self.packages.is_empty() || !self.repositories.is_empty()
    }
}

/// A file written into the running guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    pub contents: String,
    #[serde(default = "default_file_mode")]
    pub mode: u32,
}

fn default_file_mode() -> u32 {
    0o644
}

/// A package repository to add to the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: String,
}
