//! Host-side helpers.

mod process;

pub use process::{is_process_alive, kill_process};

use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::path::{Path, PathBuf};

/// Locate a helper binary.
///
/// Search order:
/// 1. Next to the current executable
/// 2. Every directory in `PATH`
pub fn find_binary(name: &str) -> GuestprepResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }

    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(GuestprepError::Config(format!(
        "binary '{}' not found next to the executable or in PATH",
        name
    )))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
