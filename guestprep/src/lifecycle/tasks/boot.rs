//! Task: Boot - start the ephemeral instance and wait for its address.

use super::{log_task_error, task_start};
use crate::lifecycle::context::{OpCtx, Phase};
use crate::pipeline::PipelineTask;
use crate::session::EphemeralSession;
use async_trait::async_trait;
use guestprep_shared::errors::GuestprepResult;

pub(crate) struct BootTask;

#[async_trait]
impl PipelineTask<OpCtx> for BootTask {
    async fn run(self: Box<Self>, ctx: OpCtx) -> GuestprepResult<()> {
        let task_name = self.name();
        let op_id = task_start(&ctx, task_name, Phase::Booting).await;

        let mut ctx = ctx.lock().await;
        let session = EphemeralSession::create(&ctx.prep, ctx.spec.clone())
            .await
            .inspect_err(|e| log_task_error(&op_id, task_name, e))?;
        let boot_timeout = ctx.prep.options.timeouts.boot();

        // Owned by the context from here on so finalization can stop it.
        let session = ctx.session.insert(session);
        let addr = session
            .wait_for_boot(boot_timeout)
            .await
            .inspect_err(|e| log_task_error(&op_id, task_name, e))?;

        ctx.guest_addr = Some(addr);
        Ok(())
    }

    fn name(&self) -> &str {
        "boot"
    }
}
