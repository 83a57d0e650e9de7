//! Pipeline status from an external command.
//!
//! Runs a status command (by default the AWS CLI's
//! `codepipeline get-pipeline-state`) and parses its JSON output into a
//! [`PipelineStatus`]. The command template may contain `{pipeline}` and
//! `{region}` placeholders.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use shipcheck_core::{
    ExecutionStatus, PipelineStatus, PipelineStatusSource, QueryError, QueryResult, StageState,
};
use tokio::process::Command;
use tracing::debug;

const PIPELINE_PLACEHOLDER: &str = "{pipeline}";
const REGION_PLACEHOLDER: &str = "{region}";

/// Default time allowed for one status command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Status source backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandStatusSource {
    command: Vec<String>,
    region: Option<String>,
    timeout: Duration,
}

impl CommandStatusSource {
    /// Use a custom command template.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            region: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// `aws codepipeline get-pipeline-state --name {pipeline} --output json`,
    /// plus `--region` when one is given.
    pub fn aws_cli(region: Option<String>) -> Self {
        let mut command: Vec<String> = [
            "aws",
            "codepipeline",
            "get-pipeline-state",
            "--name",
            PIPELINE_PLACEHOLDER,
            "--output",
            "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if region.is_some() {
            command.push("--region".to_string());
            command.push(REGION_PLACEHOLDER.to_string());
        }
        Self {
            command,
            region,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Substitute placeholders for one invocation.
    pub fn render(&self, pipeline_id: &str) -> QueryResult<Vec<String>> {
        if self.command.is_empty() {
            return Err(QueryError::Command("status command is empty".to_string()));
        }
        self.command
            .iter()
            .map(|arg| {
                let arg = arg.replace(PIPELINE_PLACEHOLDER, pipeline_id);
                if arg.contains(REGION_PLACEHOLDER) {
                    let region = self.region.as_deref().ok_or_else(|| {
                        QueryError::Command(
                            "status command uses {region} but no region is configured"
                                .to_string(),
                        )
                    })?;
                    Ok(arg.replace(REGION_PLACEHOLDER, region))
                } else {
                    Ok(arg)
                }
            })
            .collect()
    }
}

#[async_trait]
impl PipelineStatusSource for CommandStatusSource {
    async fn fetch_status(&self, pipeline_id: &str) -> QueryResult<PipelineStatus> {
        let argv = self.render(pipeline_id)?;
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| QueryError::Command("status command is empty".to_string()))?;

        debug!(command = ?argv, "Running status command");
        let child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| QueryError::Command(format!("failed to spawn {}: {}", exe, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                QueryError::Transport(format!(
                    "status command timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| QueryError::Command(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("PipelineNotFoundException") {
                return Err(QueryError::NotFound(pipeline_id.to_string()));
            }
            return Err(QueryError::Command(format!(
                "{} exited with {}: {}",
                exe,
                output.status.code().unwrap_or(-1),
                stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_pipeline_state(&stdout, pipeline_id)?.with_fetched_at(Utc::now()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineStateDoc {
    pipeline_name: Option<String>,
    #[serde(default)]
    stage_states: Vec<StageStateDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageStateDoc {
    stage_name: String,
    latest_execution: Option<LatestExecutionDoc>,
}

#[derive(Debug, Deserialize)]
struct LatestExecutionDoc {
    status: Option<String>,
}

/// Parse `get-pipeline-state` JSON.
///
/// A stage without `latestExecution` (or without a status in it) is kept as
/// an absent stage. `fallback_name` is used when the document has no
/// `pipelineName`.
pub fn parse_pipeline_state(json: &str, fallback_name: &str) -> QueryResult<PipelineStatus> {
    let doc: PipelineStateDoc =
        serde_json::from_str(json).map_err(|e| QueryError::Malformed(e.to_string()))?;

    let stages = doc
        .stage_states
        .into_iter()
        .map(|stage| {
            match stage
                .latest_execution
                .and_then(|execution| execution.status)
            {
                Some(status) => StageState::new(stage.stage_name, ExecutionStatus::parse(&status)),
                None => StageState::absent(stage.stage_name),
            }
        })
        .collect();

    Ok(PipelineStatus::new(
        doc.pipeline_name
            .unwrap_or_else(|| fallback_name.to_string()),
        stages,
    ))
}
