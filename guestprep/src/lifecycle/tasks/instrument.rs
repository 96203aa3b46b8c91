//! Task: Instrument - open the offline image and inject temporary access.

use super::{join_error, log_task_error, task_start};
use crate::instrument::{InstrumentationTarget, OfflineInstrumentor};
use crate::lifecycle::context::{OpCtx, Phase};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};

pub(crate) struct InstrumentTask;

#[async_trait]
impl PipelineTask<OpCtx> for InstrumentTask {
    async fn run(self: Box<Self>, ctx: OpCtx) -> GuestprepResult<()> {
        let task_name = self.name();
        let op_id = task_start(&ctx, task_name, Phase::Instrumenting).await;

        let (prep, family, image, uuid) = {
            let ctx = ctx.lock().await;
            (
                ctx.prep.clone(),
                ctx.family.clone(),
                ctx.image.clone(),
                ctx.spec.uuid,
            )
        };

        let public_key = prep.public_key_path();
        if !public_key.is_file() {
            let e = GuestprepError::Config(format!(
                "public key not found: {}",
                public_key.display()
            ));
            log_task_error(&op_id, task_name, &e);
            return Err(e);
        }
        let target = InstrumentationTarget {
            public_key,
            announce_helper: prep
                .announce_helper()
                .inspect_err(|e| log_task_error(&op_id, task_name, e))?,
            host_ip: prep.options.announce.host_ip,
            port: prep.announce_port(),
            uuid,
        };

        let provider = prep.guest_fs.clone();
        let mount_id = op_id.clone();
        let (state, released) = tokio::task::spawn_blocking(move || {
            let handle = provider.open(&image, &mount_id)?;
            let state = OfflineInstrumentor::new(family).setup(&*handle, &target)?;
            Ok::<_, GuestprepError>((state, handle.release()))
        })
        .await
        .map_err(|e| join_error(task_name, e))?
        .inspect_err(|e| log_task_error(&op_id, task_name, e))?;

        // Record the state before reporting a release failure so the
        // edits are still undone.
        ctx.lock().await.instrumentation = Some(state);
        released.inspect_err(|e| log_task_error(&op_id, task_name, e))
    }

    fn name(&self) -> &str {
        "instrument"
    }
}
