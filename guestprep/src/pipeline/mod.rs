//! Table-driven sequential pipeline.
//!
//! ```text
//! ExecutionPlan → Stages → Tasks
//!
//! - ExecutionPlan: ordered stages for one operation
//! - Stage: named group of tasks run one after another
//! - Task: atomic unit of work sharing a context
//! ```
//!
//! The first failing task stops the pipeline; its error is returned
//! unchanged. Cleanup is the caller's job.

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod stage;
mod task;

pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use pipeline::{ExecutionPlan, PipelineExecutor};
pub use stage::Stage;
pub use task::{BoxedTask, PipelineTask};
