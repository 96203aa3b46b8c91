//! Subprocess spawning for the hypervisor binary.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use guestprep_shared::errors::{GuestprepError, GuestprepResult};

/// Spawns the hypervisor with detached stdio.
///
/// # Arguments
/// * `binary_path` - Path to the hypervisor binary
/// * `args` - Full argument vector built from an `InstanceSpec`
///
/// # Returns
/// * `Ok(Child)` - Successfully spawned subprocess
/// * `Err(Hypervisor)` - Failed to spawn subprocess
pub(crate) fn spawn_subprocess(binary_path: &Path, args: &[String]) -> GuestprepResult<Child> {
    let mut cmd = Command::new(binary_path);
    cmd.args(args);

    // Console output goes to the serial log file when one is configured.
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    cmd.spawn().map_err(|e| {
        let err_msg = format!(
            "Failed to spawn hypervisor at {}: {}",
            binary_path.display(),
            e
        );
        tracing::error!("{}", err_msg);
        GuestprepError::Hypervisor(err_msg)
    })
}
