//! Task: Inventory - list installed packages in the running guest.

use super::{guest_addr, log_task_error, task_start};
use crate::inventory::InventoryDocument;
use crate::lifecycle::context::{OpCtx, Phase};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use guestprep_shared::errors::GuestprepResult;

pub(crate) struct InventoryTask;

#[async_trait]
impl PipelineTask<OpCtx> for InventoryTask {
    async fn run(self: Box<Self>, ctx: OpCtx) -> GuestprepResult<()> {
        let task_name = self.name();
        let op_id = task_start(&ctx, task_name, Phase::Acting).await;
        let addr = guest_addr(&ctx).await?;

        let (family, executor, timeout, description) = {
            let ctx = ctx.lock().await;
            (
                ctx.family.clone(),
                ctx.prep.executor.clone(),
                ctx.prep.options.timeouts.command(),
                ctx.image.description.clone(),
            )
        };

        let listing = executor
            .run_checked(addr, family.list_installed_command(), timeout)
            .await
            .inspect_err(|e| log_task_error(&op_id, task_name, e))?;
        let document = InventoryDocument::from_listing(&listing.stdout, family.kind(), description);
        tracing::info!(op_id = %op_id, packages = document.packages.len(), "Inventory collected");

        ctx.lock().await.inventory = Some(document);
        Ok(())
    }

    fn name(&self) -> &str {
        "inventory"
    }
}
