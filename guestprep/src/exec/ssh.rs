//! [`RemoteExecutor`] over the system `ssh` client.

use super::{RemoteCommandResult, RemoteExecutor};
use crate::runtime::constants::SSH_SERVER_ALIVE_INTERVAL;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Exit status `ssh` reserves for its own failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

pub struct SshExecutor {
    binary: PathBuf,
    private_key: PathBuf,
    user: String,
}

impl SshExecutor {
    pub fn new(private_key: PathBuf, user: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from("ssh"),
            private_key,
            user: user.into(),
        }
    }

    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = binary;
        self
    }

    /// Key-only login, no host key bookkeeping for throwaway instances,
    /// and keep-alives so long silent commands survive NAT.
    fn ssh_args(&self, addr: IpAddr, command: &str, timeout: Duration) -> Vec<String> {
        let connect_secs = timeout.as_secs().max(1);
        vec![
            "-i".to_string(),
            self.private_key.display().to_string(),
            "-o".to_string(),
            format!("ServerAliveInterval={}", SSH_SERVER_ALIVE_INTERVAL),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_secs),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "PasswordAuthentication=no".to_string(),
            format!("{}@{}", self.user, addr),
            command.to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(
        &self,
        addr: IpAddr,
        command: &str,
        timeout: Duration,
    ) -> GuestprepResult<RemoteCommandResult> {
        let start = Instant::now();
        let output = Command::new(&self.binary)
            .args(self.ssh_args(addr, command, timeout))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                GuestprepError::RemoteExecution(format!(
                    "Failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_status = match output.status.code() {
            Some(SSH_TRANSPORT_FAILURE) => {
                return Err(GuestprepError::RemoteExecution(format!(
                    "ssh to {} failed: {}",
                    addr,
                    stderr.trim()
                )));
            }
            Some(code) => code,
            None => {
                return Err(GuestprepError::RemoteExecution(format!(
                    "ssh to {} terminated by signal",
                    addr
                )));
            }
        };

        debug!(
            addr = %addr,
            command,
            exit_status,
            duration_ms = start.elapsed().as_millis() as u64,
            "Remote command finished"
        );

        Ok(RemoteCommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            exit_status,
        })
    }
}
