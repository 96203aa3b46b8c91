//! Task: Customize - repositories, files and packages in the running guest.
//!
//! Order inside the guest:
//! 1. list shipped repositories (once, only if packages or repositories
//!    are requested)
//! 2. remove shipped repositories that conflict with the request
//! 3. add requested repositories
//! 4. write requested files
//! 5. install all packages in one command
//! 6. sync

use super::{guest_addr, log_task_error, task_start};
use crate::exec::RemoteExecutor;
use crate::family::{GuestFamily, shell_quote};
use crate::lifecycle::context::{OpCtx, Phase};
use crate::pipeline::PipelineTask;
use crate::request::{CustomizationRequest, FileSpec};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub(crate) struct CustomizeTask;

#[async_trait]
impl PipelineTask<OpCtx> for CustomizeTask {
    async fn run(self: Box<Self>, ctx: OpCtx) -> GuestprepResult<()> {
        let task_name = self.name();
        let op_id = task_start(&ctx, task_name, Phase::Acting).await;

        let (request, family, executor, timeout) = {
            let ctx = ctx.lock().await;
            (
                ctx.request.clone(),
                ctx.family.clone(),
                ctx.prep.executor.clone(),
                ctx.prep.options.timeouts.command(),
            )
        };
        if request.is_empty() {
            info!(op_id = %op_id, "No additional packages or files to install, skipping customization");
            return Ok(());
        }
        let addr = guest_addr(&ctx).await?;

        let guest = GuestCommands {
            executor: executor.as_ref(),
            addr,
            timeout,
        };
        customize(&guest, family.as_ref(), &request)
            .await
            .inspect_err(|e| log_task_error(&op_id, task_name, e))?;

        info!(
            op_id = %op_id,
            packages = request.packages.len(),
            files = request.files.len(),
            repositories = request.repositories.len(),
            "Guest customized"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "customize"
    }
}

struct GuestCommands<'a> {
    executor: &'a dyn RemoteExecutor,
    addr: IpAddr,
    timeout: Duration,
}

impl GuestCommands<'_> {
    async fn run(&self, command: &str) -> GuestprepResult<String> {
        let result = self
            .executor
            .run_checked(self.addr, command, self.timeout)
            .await?;
        Ok(result.stdout)
    }
}

async fn customize(
    guest: &GuestCommands<'_>,
    family: &dyn GuestFamily,
    request: &CustomizationRequest,
) -> GuestprepResult<()> {
    if request.touches_repositories() {
        let listing = guest.run(family.list_repositories_command()).await?;
        let shipped = family.parse_repositories(&listing);

        for repo in shipped
            .iter()
            .filter(|repo| repo.conflicts_with(&request.repositories, family.media_schemes()))
        {
            debug!(id = %repo.id, url = %repo.url, "Removing conflicting repository");
            guest.run(&family.remove_repository_command(repo)).await?;
        }

        for repo in &request.repositories {
            debug!(name = %repo.name, url = %repo.url, "Adding repository");
            guest.run(&family.add_repository_command(repo)).await?;
        }
    }

    for file in &request.files {
        debug!(path = %file.path, mode = %format!("{:o}", file.mode), "Writing file");
        guest.run(&write_file_command(file)?).await?;
    }

    if !request.packages.is_empty() {
        guest.run(&family.install_command(&request.packages)).await?;
    }

    guest.run(family.sync_command()).await?;
    Ok(())
}

/// Shell command that writes `file` through base64 so any content
/// survives quoting.
fn write_file_command(file: &FileSpec) -> GuestprepResult<String> {
    let path = Path::new(&file.path);
    if !path.is_absolute() {
        return Err(GuestprepError::Config(format!(
            "file path must be absolute: {}",
            file.path
        )));
    }
    let dir = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "/".to_string());
    let quoted = shell_quote(&file.path);

    Ok(format!(
        "mkdir -p {} && echo {} | base64 -d > {} && chmod {:o} {}",
        shell_quote(&dir),
        STANDARD.encode(file.contents.as_bytes()),
        quoted,
        file.mode,
        quoted
    ))
}
