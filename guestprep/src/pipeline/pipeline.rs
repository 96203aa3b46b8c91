//! Pipeline executor.

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::Stage;
use super::task::BoxedTask;
use guestprep_shared::errors::GuestprepResult;
use std::time::Instant;
use tracing::warn;

pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }

    pub fn stages(self) -> Vec<Stage<BoxedTask<Ctx>>> {
        self.stages
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .map(|task| task.name())
            .collect()
    }
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every stage's tasks in order, stopping at the first error.
    ///
    /// `Ctx` is cloned into each task; share state through interior
    /// mutability.
    pub async fn execute<Ctx>(plan: ExecutionPlan<Ctx>, ctx: Ctx) -> GuestprepResult<PipelineMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::new();

        for stage in plan.stages() {
            let stage_start = Instant::now();
            let mut task_metrics = Vec::new();

            for task in stage.tasks {
                let name = task.name().to_string();
                let task_start = Instant::now();
                if let Err(e) = task.run(ctx.clone()).await {
                    warn!(
                        stage = stage.name,
                        task = %name,
                        duration_ms = task_start.elapsed().as_millis() as u64,
                        "Pipeline stopped at failing task"
                    );
                    return Err(e);
                }
                task_metrics.push(TaskMetrics {
                    name,
                    duration_ms: task_start.elapsed().as_millis(),
                });
            }

            stage_metrics.push(StageMetrics {
                name: stage.name,
                duration_ms: stage_start.elapsed().as_millis(),
                tasks: task_metrics,
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }
}
