//! End-to-end guest operations.
//!
//! ## Architecture
//!
//! Every operation is one pass through the same lifecycle:
//!
//! ```text
//! Idle → Instrumenting → Booting → Acting → ShuttingDown → Uninstrumenting → Done
//!              └────────────┴─────────┴──────────┴──→ Failed (after cleanup)
//! ```
//!
//! The forward stages are a pipeline; the two cleanup stages are not.
//! They run in [`Orchestrator::finalize`] on every exit path, log their
//! own errors, and never replace the error that stopped the pipeline.
//!
//! Execution plans:
//!
//! ```text
//! generate_inventory:               Instrument → Boot → Inventory
//! customize:                        Instrument → Boot → Customize
//! customize_and_generate_inventory: Instrument → Boot → Customize, Inventory
//! ```

mod context;
mod tasks;

pub use context::Phase;

use crate::disk::DiskImage;
use crate::family::GuestFamily;
use crate::instrument::OfflineInstrumentor;
use crate::inventory::InventoryDocument;
use crate::pipeline::{BoxedTask, ExecutionPlan, PipelineExecutor, Stage};
use crate::request::CustomizationRequest;
use crate::runtime::PrepContext;
use crate::vmm::InstanceSpec;
use context::{OpCtx, OperationContext};
use guestprep_shared::errors::{GuestprepError, GuestprepResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tasks::{BootTask, CustomizeTask, InstrumentTask, InventoryTask};
use tracing::{Instrument, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Inventory,
    Customize,
    CustomizeAndInventory,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Inventory => "generate_inventory",
            Operation::Customize => "customize",
            Operation::CustomizeAndInventory => "customize_and_generate_inventory",
        }
    }
}

fn execution_plan(operation: Operation) -> ExecutionPlan<OpCtx> {
    let act: Vec<BoxedTask<OpCtx>> = match operation {
        Operation::Inventory => vec![Box::new(InventoryTask)],
        Operation::Customize => vec![Box::new(CustomizeTask)],
        Operation::CustomizeAndInventory => {
            vec![Box::new(CustomizeTask), Box::new(InventoryTask)]
        }
    };

    ExecutionPlan::new(vec![
        Stage::single("instrument", Box::new(InstrumentTask) as BoxedTask<OpCtx>),
        Stage::single("boot", Box::new(BootTask) as BoxedTask<OpCtx>),
        Stage::new("act", act),
    ])
}

/// Runs guest operations for one family.
///
/// Clones share state: operations on different images may run
/// concurrently; a second operation on an image that is already in
/// flight is rejected with `InvalidState`.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    prep: PrepContext,
    family: Arc<dyn GuestFamily>,
    /// Images that failed a prerequisite check.
    unsupported: Mutex<HashSet<PathBuf>>,
    in_flight: Mutex<HashSet<PathBuf>>,
}

/// Marks an image busy until dropped.
struct InFlight {
    inner: Arc<OrchestratorInner>,
    key: PathBuf,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

impl Orchestrator {
    pub fn new(prep: PrepContext, family: Arc<dyn GuestFamily>) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                prep,
                family,
                unsupported: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn family(&self) -> &dyn GuestFamily {
        self.inner.family.as_ref()
    }

    /// Boot `image` and list its installed packages.
    pub async fn generate_inventory(&self, image: &DiskImage) -> GuestprepResult<InventoryDocument> {
        let ctx = self
            .run(image, CustomizationRequest::default(), Operation::Inventory)
            .await?;
        take_inventory(ctx).await
    }

    /// Apply `request` inside the guest.
    ///
    /// An empty request (no packages, no files) returns at once without
    /// touching the image.
    pub async fn customize(
        &self,
        image: &DiskImage,
        request: &CustomizationRequest,
    ) -> GuestprepResult<()> {
        if request.is_empty() {
            info!(
                image = %image.path.display(),
                "No additional packages or files to install, skipping customization"
            );
            return Ok(());
        }
        self.run(image, request.clone(), Operation::Customize).await?;
        Ok(())
    }

    /// [`customize`](Self::customize) then
    /// [`generate_inventory`](Self::generate_inventory) in one boot.
    pub async fn customize_and_generate_inventory(
        &self,
        image: &DiskImage,
        request: &CustomizationRequest,
    ) -> GuestprepResult<InventoryDocument> {
        let ctx = self
            .run(image, request.clone(), Operation::CustomizeAndInventory)
            .await?;
        take_inventory(ctx).await
    }

    pub fn is_unsupported(&self, image: &DiskImage) -> bool {
        self.inner.unsupported.lock().contains(&image_key(image))
    }

    /// Allow a previously unsupported image to be tried again.
    ///
    /// Returns whether the image was marked unsupported.
    pub fn forget_unsupported(&self, image: &DiskImage) -> bool {
        self.inner.unsupported.lock().remove(&image_key(image))
    }

    fn begin(&self, image: &DiskImage) -> GuestprepResult<InFlight> {
        let key = image_key(image);
        if self.inner.unsupported.lock().contains(&key) {
            return Err(GuestprepError::PrerequisiteMissing(format!(
                "{} was found unsupported by a previous operation",
                image.path.display()
            )));
        }
        if !self.inner.in_flight.lock().insert(key.clone()) {
            return Err(GuestprepError::InvalidState(format!(
                "an operation on {} is already in progress",
                image.path.display()
            )));
        }
        Ok(InFlight {
            inner: Arc::clone(&self.inner),
            key,
        })
    }

    async fn run(
        &self,
        image: &DiskImage,
        request: CustomizationRequest,
        operation: Operation,
    ) -> GuestprepResult<OpCtx> {
        let _in_flight = self.begin(image)?;

        let op_id = ulid::Ulid::new().to_string();
        let span = tracing::info_span!(
            "operation",
            op_id = %op_id,
            operation = operation.as_str(),
            image = %image.path.display()
        );
        self.run_operation(op_id, image, request, operation)
            .instrument(span)
            .await
    }

    async fn run_operation(
        &self,
        op_id: String,
        image: &DiskImage,
        request: CustomizationRequest,
        operation: Operation,
    ) -> GuestprepResult<OpCtx> {
        let start = Instant::now();
        let prep = &self.inner.prep;
        let family = &self.inner.family;

        let spec = InstanceSpec::new(
            image.clone(),
            family.disk_bus(),
            family.nic_model(),
            &prep.options.vm.bridge,
            prep.options.vm.memory_mib,
            prep.options.vm.cpus,
        );
        let console_log = prep
            .layout
            .logs_dir()
            .join(format!("{}.console.log", spec.name));
        let spec = spec.with_console_log(console_log);
        info!(instance = %spec.name, family = family.name(), "Operation started");

        let ctx: OpCtx = Arc::new(tokio::sync::Mutex::new(OperationContext {
            op_id: op_id.clone(),
            image: image.clone(),
            spec,
            prep: prep.clone(),
            family: Arc::clone(family),
            request,
            phase: Phase::Idle,
            instrumentation: None,
            session: None,
            guest_addr: None,
            inventory: None,
        }));

        let result = PipelineExecutor::execute(execution_plan(operation), Arc::clone(&ctx)).await;
        self.finalize(&ctx, result.is_err()).await;

        match result {
            Ok(metrics) => {
                metrics.log_stages(&op_id);
                info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Operation completed"
                );
                Ok(ctx)
            }
            Err(e) => {
                if e.is_prerequisite_missing() {
                    self.inner.unsupported.lock().insert(image_key(image));
                }
                warn!(
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Operation failed"
                );
                Err(e)
            }
        }
    }

    /// Stop the guest and undo instrumentation. Never fails.
    async fn finalize(&self, ctx: &OpCtx, failed: bool) {
        let mut ctx = ctx.lock().await;

        if let Some(mut session) = ctx.session.take() {
            ctx.set_phase(Phase::ShuttingDown);
            session
                .shutdown(
                    self.inner.prep.executor.as_ref(),
                    self.inner.family.shutdown_command(),
                )
                .await;
        }

        if let Some(state) = ctx.instrumentation.take() {
            ctx.set_phase(Phase::Uninstrumenting);
            let provider = Arc::clone(&self.inner.prep.guest_fs);
            let family = Arc::clone(&self.inner.family);
            let image = ctx.image.clone();
            let mount_id = format!("{}-teardown", ctx.op_id);

            let outcome = tokio::task::spawn_blocking(move || {
                let handle = provider.open(&image, &mount_id)?;
                OfflineInstrumentor::new(family).teardown(&*handle, &state);
                handle.release()
            })
            .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    error = %e,
                    "Failed to uninstrument image; temporary access may remain"
                ),
                Err(e) => error!(error = %e, "Uninstrument task panicked"),
            }
        }

        ctx.set_phase(if failed { Phase::Failed } else { Phase::Done });
    }
}

async fn take_inventory(ctx: OpCtx) -> GuestprepResult<InventoryDocument> {
    ctx.lock()
        .await
        .inventory
        .take()
        .ok_or_else(|| GuestprepError::Internal("inventory task must run first".into()))
}

fn image_key(image: &DiskImage) -> PathBuf {
    std::fs::canonicalize(&image.path).unwrap_or_else(|_| image.path.clone())
}
