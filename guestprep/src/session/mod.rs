//! One ephemeral boot of a guest image.
//!
//! An [`EphemeralSession`] owns the running instance for the duration of
//! one operation. Every path out of it ends in [`EphemeralSession::destroy`];
//! dropping a live session destroys it too.

use crate::exec::RemoteExecutor;
use crate::net::NetworkPresence;
use crate::runtime::PrepContext;
use crate::runtime::options::Timeouts;
use crate::vmm::InstanceSpec;
use crate::vmm::controller::VmmHandler;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct EphemeralSession {
    spec: InstanceSpec,
    handler: Option<Box<dyn VmmHandler>>,
    guest_addr: Option<IpAddr>,
    presence: Arc<dyn NetworkPresence>,
    timeouts: Timeouts,
}

impl EphemeralSession {
    /// Start an instance for `spec`.
    pub async fn create(ctx: &PrepContext, spec: InstanceSpec) -> GuestprepResult<Self> {
        let handler = ctx.controller.start(&spec).await?;
        info!(
            instance = %spec.name,
            uuid = %spec.uuid,
            mac = %spec.nic.mac,
            disk = %spec.disk.path.display(),
            "Ephemeral instance started"
        );

        Ok(Self {
            spec,
            handler: Some(handler),
            guest_addr: None,
            presence: Arc::clone(&ctx.presence),
            timeouts: ctx.options.timeouts.clone(),
        })
    }

    pub fn guest_addr(&self) -> Option<IpAddr> {
        self.guest_addr
    }

    /// Whether the instance has not been destroyed yet.
    pub fn is_live(&self) -> bool {
        self.handler.is_some()
    }

    fn is_running(&self) -> bool {
        self.handler.as_ref().is_some_and(|h| h.is_running())
    }

    /// Poll for the guest's address until `timeout` passes.
    ///
    /// Poll, then check the deadline, then sleep: a zero timeout polls
    /// exactly once.
    pub async fn wait_for_boot(&mut self, timeout: Duration) -> GuestprepResult<IpAddr> {
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            if let Some(addr) = self.presence.resolve(&self.spec).await? {
                info!(instance = %self.spec.name, addr = %addr, polls, "Guest is up");
                self.guest_addr = Some(addr);
                return Ok(addr);
            }

            if !self.is_running() {
                return Err(GuestprepError::Hypervisor(format!(
                    "instance {} stopped while booting",
                    self.spec.name
                )));
            }

            if Instant::now() >= deadline {
                warn!(instance = %self.spec.name, polls, "Guest did not come up in time");
                return Err(GuestprepError::BootTimeout { timeout });
            }

            tokio::time::sleep(self.timeouts.poll_interval()).await;
        }
    }

    /// Poll until the instance stops running or `timeout` passes.
    pub async fn wait_for_shutdown(&mut self, timeout: Duration) -> GuestprepResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(GuestprepError::ShutdownTimeout { timeout });
            }
            tokio::time::sleep(self.timeouts.poll_interval()).await;
        }
    }

    /// Stop the guest, gracefully if possible. Never fails.
    ///
    /// With a known address the guest is asked to run `command` and given
    /// the shutdown timeout to stop. Anything else ends in [`destroy`](Self::destroy).
    pub async fn shutdown(&mut self, executor: &dyn RemoteExecutor, command: &str) {
        if !self.is_live() {
            return;
        }

        match self.guest_addr {
            Some(addr) => match executor.run(addr, command, self.timeouts.command()).await {
                Ok(_) => match self.wait_for_shutdown(self.timeouts.shutdown()).await {
                    Ok(()) => debug!(instance = %self.spec.name, "Guest shut down"),
                    Err(e) => {
                        warn!(instance = %self.spec.name, error = %e, "Guest did not shut down in time, destroying")
                    }
                },
                Err(e) => {
                    warn!(instance = %self.spec.name, error = %e, "Failed to shut down guest, destroying")
                }
            },
            None => debug!(instance = %self.spec.name, "No guest address, destroying"),
        }

        if let Err(e) = self.destroy() {
            warn!(instance = %self.spec.name, error = %e, "Failed to destroy instance");
        }
    }

    /// Hard stop. Idempotent.
    pub fn destroy(&mut self) -> GuestprepResult<()> {
        let Some(mut handler) = self.handler.take() else {
            return Ok(());
        };
        let was_running = handler.is_running();
        self.presence.forget(&self.spec);
        handler.destroy()?;
        info!(instance = handler.id(), was_running, "Ephemeral instance destroyed");
        Ok(())
    }
}

impl Drop for EphemeralSession {
    fn drop(&mut self) {
        if self.handler.is_some() {
            warn!(instance = %self.spec.name, "Session dropped while live, destroying");
            if let Err(e) = self.destroy() {
                warn!(instance = %self.spec.name, error = %e, "Failed to destroy instance on drop");
            }
        }
    }
}
