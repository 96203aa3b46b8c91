use tracing::info;

#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub name: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub name: &'static str,
    pub duration_ms: u128,
    pub tasks: Vec<TaskMetrics>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn task_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.tasks.iter())
            .map(|task| task.name.as_str())
            .collect()
    }

    pub fn log_stages(&self, op_id: &str) {
        for stage in &self.stages {
            info!(
                op_id,
                stage = stage.name,
                duration_ms = stage.duration_ms as u64,
                tasks = stage.tasks.len(),
                "Stage completed"
            );
        }
        info!(
            op_id,
            total_duration_ms = self.total_duration_ms as u64,
            "Pipeline completed"
        );
    }
}
