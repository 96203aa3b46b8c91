//! Pipeline tasks for guest operations.

mod boot;
mod customize;
mod instrument;
mod inventory;

pub(crate) use boot::BootTask;
pub(crate) use customize::CustomizeTask;
pub(crate) use instrument::InstrumentTask;
pub(crate) use inventory::InventoryTask;

use super::context::{OpCtx, Phase};
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::IpAddr;

/// Enter `phase` and log the task start. Returns the operation id.
pub(crate) async fn task_start(ctx: &OpCtx, task_name: &str, phase: Phase) -> String {
    let mut ctx = ctx.lock().await;
    ctx.set_phase(phase);
    tracing::debug!(op_id = %ctx.op_id, task = task_name, phase = %phase, "Task started");
    ctx.op_id.clone()
}

pub(crate) fn log_task_error(op_id: &str, task_name: &str, error: &GuestprepError) {
    tracing::error!(op_id, task = task_name, error = %error, "Task failed");
}

pub(crate) fn join_error(task_name: &str, e: tokio::task::JoinError) -> GuestprepError {
    GuestprepError::Internal(format!("{} task panicked: {}", task_name, e))
}

/// Address found by the boot task.
pub(crate) async fn guest_addr(ctx: &OpCtx) -> GuestprepResult<IpAddr> {
    ctx.lock()
        .await
        .guest_addr
        .ok_or_else(|| GuestprepError::Internal("boot task must run first".into()))
}
