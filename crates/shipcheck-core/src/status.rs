//! Pipeline status snapshots and stage aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest execution status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    InProgress,
    Succeeded,
    Failed,
    Stopped,
    Unknown,
}

impl ExecutionStatus {
    /// Parse a status string as reported by the pipeline service.
    ///
    /// Matching is case-insensitive. `Stopping` is still moving and counts as
    /// in progress; `Superseded` and `Cancelled` never succeed and count as
    /// stopped. Anything unrecognised is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inprogress" | "in_progress" | "stopping" => ExecutionStatus::InProgress,
            "succeeded" => ExecutionStatus::Succeeded,
            "failed" => ExecutionStatus::Failed,
            "stopped" | "superseded" | "cancelled" => ExecutionStatus::Stopped,
            _ => ExecutionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::InProgress => "InProgress",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Stopped => "Stopped",
            ExecutionStatus::Unknown => "Unknown",
        }
    }

    /// Terminal and unsuccessful.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::Stopped)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage of a pipeline and its latest execution status.
///
/// `latest_execution` is `None` when the stage has never run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageState {
    pub name: String,
    pub latest_execution: Option<ExecutionStatus>,
}

impl StageState {
    pub fn new(name: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            name: name.into(),
            latest_execution: Some(status),
        }
    }

    /// A stage with no execution data.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latest_execution: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.latest_execution == Some(ExecutionStatus::Succeeded)
    }

    /// Status name, or `absent` when the stage never ran.
    pub fn status_label(&self) -> &'static str {
        self.latest_execution
            .as_ref()
            .map(ExecutionStatus::as_str)
            .unwrap_or("absent")
    }
}

/// Immutable snapshot of a pipeline, fetched once per poll attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub pipeline: String,
    pub stages: Vec<StageState>,
    /// When the source produced the snapshot, if it says.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PipelineStatus {
    pub fn new(pipeline: impl Into<String>, stages: Vec<StageState>) -> Self {
        Self {
            pipeline: pipeline.into(),
            stages,
            fetched_at: None,
        }
    }

    pub fn with_fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(at);
        self
    }

    /// True only if there is at least one stage and every stage succeeded.
    pub fn all_succeeded(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(StageState::succeeded)
    }

    /// First stage whose latest execution failed or was stopped.
    pub fn first_terminal_failure(&self) -> Option<&StageState> {
        self.stages.iter().find(|s| {
            s.latest_execution
                .map(|status| status.is_terminal_failure())
                .unwrap_or(false)
        })
    }

    pub fn succeeded_count(&self) -> usize {
        self.stages.iter().filter(|s| s.succeeded()).count()
    }

    /// Compact `name=Status` listing for log lines.
    pub fn summary(&self) -> String {
        if self.stages.is_empty() {
            return "(no stages)".to_string();
        }
        self.stages
            .iter()
            .map(|s| format!("{}={}", s.name, s.status_label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Whether the stage poller stops early on a failed stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFailureMode {
    /// Only ask "has everything succeeded yet"; a failed stage is treated
    /// like a slow one until the retry budget runs out.
    #[default]
    WaitForSuccess,
    /// Give up on the first snapshot with a `Failed` or `Stopped` stage.
    FailFast,
}

/// Aggregate judgement of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageVerdict {
    Succeeded,
    Pending,
    Failed(String),
}

/// Evaluate a snapshot under the given failure mode.
pub fn evaluate_stages(status: &PipelineStatus, mode: StageFailureMode) -> StageVerdict {
    if status.all_succeeded() {
        return StageVerdict::Succeeded;
    }
    if mode == StageFailureMode::FailFast {
        if let Some(stage) = status.first_terminal_failure() {
            return StageVerdict::Failed(format!(
                "stage '{}' is {}",
                stage.name,
                stage.status_label()
            ));
        }
    }
    StageVerdict::Pending
}
