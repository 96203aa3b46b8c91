//! QEMU-backed instances.
//!
//! Each instance is a `qemu-system-*` child process. The handler owns the
//! `Child` so that running-state queries reap an exited hypervisor instead
//! of mistaking its zombie for a live guest.

use super::spawn::spawn_subprocess;
use super::{VmmController, VmmHandler};
use crate::util::kill_process;
use crate::vmm::InstanceSpec;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;

/// How long a fresh hypervisor must survive before it counts as started.
const STARTUP_GRACE: Duration = Duration::from_millis(250);

pub struct QemuController {
    binary: PathBuf,
}

impl QemuController {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait::async_trait]
impl VmmController for QemuController {
    async fn start(&self, spec: &InstanceSpec) -> GuestprepResult<Box<dyn VmmHandler>> {
        let args = qemu_args(spec);
        tracing::debug!(
            instance = %spec.name,
            binary = %self.binary.display(),
            args = ?args,
            "Starting hypervisor"
        );

        let mut child = spawn_subprocess(&self.binary, &args)?;

        // QEMU rejects bad descriptions (missing disk, unknown bridge) by
        // exiting immediately.
        tokio::time::sleep(STARTUP_GRACE).await;
        if let Some(status) = child.try_wait()? {
            return Err(GuestprepError::Hypervisor(format!(
                "instance {} exited during startup with {}",
                spec.name, status
            )));
        }

        let pid = child.id();
        tracing::info!(instance = %spec.name, pid, "Instance started");

        Ok(Box::new(QemuHandler {
            name: spec.name.clone(),
            pid,
            child: Mutex::new(child),
        }))
    }
}

pub struct QemuHandler {
    name: String,
    pid: u32,
    child: Mutex<Child>,
}

impl VmmHandler for QemuHandler {
    fn destroy(&mut self) -> GuestprepResult<()> {
        let mut child = self.child.lock();

        if let Some(status) = child.try_wait()? {
            tracing::debug!(instance = %self.name, %status, "Instance already exited");
            return Ok(());
        }

        if !kill_process(self.pid) {
            return Err(GuestprepError::Hypervisor(format!(
                "failed to kill instance {} (pid {})",
                self.name, self.pid
            )));
        }

        let status = child.wait()?;
        tracing::info!(instance = %self.name, %status, "Instance destroyed");
        Ok(())
    }

    fn is_running(&self) -> bool {
        matches!(self.child.lock().try_wait(), Ok(None))
    }

    fn id(&self) -> &str {
        &self.name
    }
}

/// Build the QEMU argument vector for an instance.
pub(crate) fn qemu_args(spec: &InstanceSpec) -> Vec<String> {
    let mut args = vec![
        "-name".to_string(),
        spec.name.clone(),
        "-uuid".to_string(),
        spec.uuid.to_string(),
        "-machine".to_string(),
        "accel=kvm:tcg".to_string(),
        "-m".to_string(),
        spec.memory_mib.to_string(),
        "-smp".to_string(),
        spec.cpus.to_string(),
        "-drive".to_string(),
        format!(
            "file={},format={},if={}",
            spec.disk.path.display(),
            spec.disk.format.as_str(),
            spec.disk_bus.as_str()
        ),
        "-netdev".to_string(),
        format!("bridge,id=net0,br={}", spec.nic.bridge),
        "-device".to_string(),
        format!("{},netdev=net0,mac={}", spec.nic.model, spec.nic.mac),
        "-display".to_string(),
        "none".to_string(),
        "-no-reboot".to_string(),
    ];

    match &spec.console_log {
        Some(path) => {
            args.push("-serial".to_string());
            args.push(format!("file:{}", path.display()));
        }
        None => {
            args.push("-serial".to_string());
            args.push("null".to_string());
        }
    }

    args
}
