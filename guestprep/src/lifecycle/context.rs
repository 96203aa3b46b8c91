//! Per-operation pipeline context.

use crate::disk::DiskImage;
use crate::family::GuestFamily;
use crate::instrument::InstrumentationState;
use crate::inventory::InventoryDocument;
use crate::request::CustomizationRequest;
use crate::runtime::PrepContext;
use crate::session::EphemeralSession;
use crate::vmm::InstanceSpec;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Where an operation is in its lifecycle.
///
/// `Failed` is entered from any phase up to `ShuttingDown`; the
/// operation still passes through `Uninstrumenting` when there is
/// something to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Instrumenting,
    Booting,
    Acting,
    ShuttingDown,
    Uninstrumenting,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Instrumenting => "instrumenting",
            Phase::Booting => "booting",
            Phase::Acting => "acting",
            Phase::ShuttingDown => "shutting_down",
            Phase::Uninstrumenting => "uninstrumenting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by the tasks of one operation.
///
/// The instrumentation state and session are owned here exclusively and
/// handed to finalization once the pipeline stops.
pub(crate) struct OperationContext {
    pub op_id: String,
    pub image: DiskImage,
    pub spec: InstanceSpec,
    pub prep: PrepContext,
    pub family: Arc<dyn GuestFamily>,
    pub request: CustomizationRequest,
    pub phase: Phase,
    pub instrumentation: Option<InstrumentationState>,
    pub session: Option<EphemeralSession>,
    pub guest_addr: Option<IpAddr>,
    pub inventory: Option<InventoryDocument>,
}

impl OperationContext {
    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(
                op_id = %self.op_id,
                from = %self.phase,
                to = %phase,
                "Operation phase changed"
            );
            self.phase = phase;
        }
    }
}

pub(crate) type OpCtx = Arc<Mutex<OperationContext>>;
