//! Running commands inside a booted guest.

mod ssh;

pub use ssh::SshExecutor;

use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::IpAddr;
use std::time::Duration;

/// Captured output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl RemoteCommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on the guest at `addr`.
    ///
    /// `timeout` bounds connection establishment. A non-zero exit status
    /// is returned in the result; only transport failures are errors.
    async fn run(
        &self,
        addr: IpAddr,
        command: &str,
        timeout: Duration,
    ) -> GuestprepResult<RemoteCommandResult>;

    /// Like [`run`](Self::run), but a non-zero exit status is an error.
    async fn run_checked(
        &self,
        addr: IpAddr,
        command: &str,
        timeout: Duration,
    ) -> GuestprepResult<RemoteCommandResult> {
        let result = self.run(addr, command, timeout).await?;
        if !result.success() {
            return Err(GuestprepError::RemoteExecution(format!(
                "`{}` on {} exited with status {}: {}",
                command,
                addr,
                result.exit_status,
                result.stderr.trim()
            )));
        }
        Ok(result)
    }
}
