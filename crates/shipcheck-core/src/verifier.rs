//! Verification orchestrator.
//!
//! Runs the stage poller to completion and, only if every stage succeeded,
//! the endpoint poller. Reports exactly one terminal state:
//!
//! ```text
//! NotStarted -> PollingPipeline -> PollingEndpoint -> Verified
//!                     |                  |
//!                     v                  v
//!              PipelineFailed      EndpointFailed
//! ```

use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::collaborators::{HttpProbe, PipelineStatusSource};
use crate::endpoint_poller::{EndpointObservation, EndpointPoller};
use crate::error::Result;
use crate::obs;
use crate::poll::{PollOutcome, PollState};
use crate::policy::RetryPolicy;
use crate::predicate::Predicate;
use crate::sleeper::Sleeper;
use crate::stage_poller::StagePoller;
use crate::status::{PipelineStatus, StageFailureMode};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    NotStarted,
    PollingPipeline,
    PollingEndpoint,
    Verified,
    PipelineFailed,
    EndpointFailed,
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationState::NotStarted => "not_started",
            VerificationState::PollingPipeline => "polling_pipeline",
            VerificationState::PollingEndpoint => "polling_endpoint",
            VerificationState::Verified => "verified",
            VerificationState::PipelineFailed => "pipeline_failed",
            VerificationState::EndpointFailed => "endpoint_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationState::Verified
                | VerificationState::PipelineFailed
                | VerificationState::EndpointFailed
        )
    }
}

impl std::fmt::Display for VerificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run did not verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Every attempt was used without reaching the success condition.
    RetryBudgetExhausted { attempts: u32 },
    /// The target reached a state that will never succeed (fail-fast mode).
    TerminalFailure { reason: String },
    /// The status source could not answer.
    QueryFailed { error: String },
    /// The outer wall-clock deadline fired first.
    DeadlineExceeded { deadline_ms: u64 },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::RetryBudgetExhausted { attempts } => {
                write!(f, "retry budget exhausted after {} attempt(s)", attempts)
            }
            FailureReason::TerminalFailure { reason } => write!(f, "terminal failure: {}", reason),
            FailureReason::QueryFailed { error } => write!(f, "{}", error),
            FailureReason::DeadlineExceeded { deadline_ms } => {
                write!(f, "deadline of {}ms exceeded", deadline_ms)
            }
        }
    }
}

/// Attempts made by one phase and the last thing it saw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseDetail<T> {
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_observed: Option<T>,
}

impl<T: Clone> PhaseDetail<T> {
    fn from_state(state: &PollState<T>) -> Self {
        Self {
            attempts: state.attempts(),
            max_attempts: state.policy().max_attempts(),
            last_observed: state.last_observed().cloned(),
        }
    }
}

/// Diagnostic detail accumulated over a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationDetail {
    /// `None` when verified.
    pub reason: Option<FailureReason>,
    pub pipeline: PhaseDetail<PipelineStatus>,
    /// `None` if the endpoint phase never started.
    pub endpoint: Option<PhaseDetail<EndpointObservation>>,
}

/// Single result of a verification run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified(VerificationDetail),
    PipelineFailed(VerificationDetail),
    EndpointFailed(VerificationDetail),
}

impl VerificationOutcome {
    pub fn state(&self) -> VerificationState {
        match self {
            VerificationOutcome::Verified(_) => VerificationState::Verified,
            VerificationOutcome::PipelineFailed(_) => VerificationState::PipelineFailed,
            VerificationOutcome::EndpointFailed(_) => VerificationState::EndpointFailed,
        }
    }

    pub fn detail(&self) -> &VerificationDetail {
        match self {
            VerificationOutcome::Verified(d)
            | VerificationOutcome::PipelineFailed(d)
            | VerificationOutcome::EndpointFailed(d) => d,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified(_))
    }

    /// SHA-256 of the JSON form. Equal outcomes give equal fingerprints.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let detail = self.detail();
        let mut line = format!(
            "{}: pipeline {}/{} attempt(s)",
            self.state(),
            detail.pipeline.attempts,
            detail.pipeline.max_attempts
        );
        if let Some(endpoint) = &detail.endpoint {
            line.push_str(&format!(
                ", endpoint {}/{} attempt(s)",
                endpoint.attempts, endpoint.max_attempts
            ));
        }
        if let Some(reason) = &detail.reason {
            line.push_str(&format!(" ({})", reason));
        }
        line
    }
}

/// Progress of one run. Lives outside the run future so a deadline can drop
/// the future and still report how far it got.
struct RunProgress {
    state: VerificationState,
    started: Instant,
    pipeline: PollState<PipelineStatus>,
    endpoint: Option<PollState<EndpointObservation>>,
}

impl RunProgress {
    fn new(pipeline_policy: RetryPolicy) -> Self {
        Self {
            state: VerificationState::NotStarted,
            started: Instant::now(),
            pipeline: PollState::new(pipeline_policy),
            endpoint: None,
        }
    }

    fn transition(&mut self, next: VerificationState) {
        debug!(from = %self.state, to = %next, "verification state transition");
        self.state = next;
    }

    fn conclude(
        &mut self,
        terminal: VerificationState,
        reason: Option<FailureReason>,
    ) -> VerificationOutcome {
        debug_assert!(terminal.is_terminal(), "{} is not a terminal state", terminal);
        self.transition(terminal);
        obs::emit_verify_finished(terminal.as_str(), self.started.elapsed().as_millis() as u64);

        let detail = VerificationDetail {
            reason,
            pipeline: PhaseDetail::from_state(&self.pipeline),
            endpoint: self.endpoint.as_ref().map(PhaseDetail::from_state),
        };
        match terminal {
            VerificationState::Verified => VerificationOutcome::Verified(detail),
            VerificationState::EndpointFailed => VerificationOutcome::EndpointFailed(detail),
            _ => VerificationOutcome::PipelineFailed(detail),
        }
    }

    /// Terminal state for the phase the run was in when it was cut short.
    fn interrupted(&mut self, reason: FailureReason) -> VerificationOutcome {
        let terminal = match self.state {
            VerificationState::PollingEndpoint => VerificationState::EndpointFailed,
            _ => VerificationState::PipelineFailed,
        };
        self.conclude(terminal, Some(reason))
    }
}

/// Two-phase deployment verifier.
///
/// Holds only shared references to its collaborators; every call to
/// [`verify`](Self::verify) starts from fresh state, so one verifier can
/// serve concurrent runs.
pub struct Verifier<'a> {
    source: &'a dyn PipelineStatusSource,
    probe: &'a dyn HttpProbe,
    sleeper: &'a dyn Sleeper,
    mode: StageFailureMode,
}

impl<'a> Verifier<'a> {
    pub fn new(
        source: &'a dyn PipelineStatusSource,
        probe: &'a dyn HttpProbe,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            source,
            probe,
            sleeper,
            mode: StageFailureMode::default(),
        }
    }

    /// Choose how the stage poller treats a failed stage.
    pub fn with_stage_failure_mode(mut self, mode: StageFailureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run both phases and report the terminal state.
    pub async fn verify(
        &self,
        pipeline_id: &str,
        address: &str,
        pipeline_policy: RetryPolicy,
        endpoint_policy: RetryPolicy,
        predicate: &Predicate,
    ) -> VerificationOutcome {
        let mut progress = RunProgress::new(pipeline_policy);
        self.run(pipeline_id, address, endpoint_policy, predicate, &mut progress)
            .instrument(obs::verify_span(&Uuid::new_v4().to_string(), pipeline_id))
            .await
    }

    /// Like [`verify`](Self::verify), bounded by a wall-clock deadline.
    ///
    /// When the deadline fires the in-flight query or sleep is dropped and
    /// the failure state of the current phase is returned with
    /// [`FailureReason::DeadlineExceeded`].
    pub async fn verify_within(
        &self,
        pipeline_id: &str,
        address: &str,
        pipeline_policy: RetryPolicy,
        endpoint_policy: RetryPolicy,
        predicate: &Predicate,
        deadline: Duration,
    ) -> VerificationOutcome {
        let mut progress = RunProgress::new(pipeline_policy);
        let span = obs::verify_span(&Uuid::new_v4().to_string(), pipeline_id);
        let run = self
            .run(pipeline_id, address, endpoint_policy, predicate, &mut progress)
            .instrument(span.clone());

        let result = tokio::time::timeout(deadline, run).await;
        match result {
            Ok(outcome) => outcome,
            Err(_) => {
                let _entered = span.enter();
                progress.interrupted(FailureReason::DeadlineExceeded {
                    deadline_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    async fn run(
        &self,
        pipeline_id: &str,
        address: &str,
        endpoint_policy: RetryPolicy,
        predicate: &Predicate,
        progress: &mut RunProgress,
    ) -> VerificationOutcome {
        obs::emit_verify_started(pipeline_id, address);
        progress.transition(VerificationState::PollingPipeline);

        let stages = StagePoller::new(self.source, self.sleeper, *progress.pipeline.policy())
            .with_mode(self.mode);
        let failure = match stages.drive(pipeline_id, &mut progress.pipeline).await {
            Ok(PollOutcome::Succeeded) => None,
            Ok(PollOutcome::TimedOut(attempts)) => {
                Some(FailureReason::RetryBudgetExhausted { attempts })
            }
            Ok(PollOutcome::FailedTerminal(reason)) => Some(FailureReason::TerminalFailure { reason }),
            Err(e) => Some(FailureReason::QueryFailed {
                error: e.to_string(),
            }),
        };
        if let Some(reason) = failure {
            return progress.conclude(VerificationState::PipelineFailed, Some(reason));
        }

        progress.transition(VerificationState::PollingEndpoint);
        let endpoint = EndpointPoller::new(self.probe, self.sleeper, endpoint_policy);
        let state = progress.endpoint.insert(PollState::new(endpoint_policy));

        match endpoint.drive(address, predicate, state).await {
            PollOutcome::Succeeded => progress.conclude(VerificationState::Verified, None),
            PollOutcome::TimedOut(attempts) => progress.conclude(
                VerificationState::EndpointFailed,
                Some(FailureReason::RetryBudgetExhausted { attempts }),
            ),
            PollOutcome::FailedTerminal(reason) => progress.conclude(
                VerificationState::EndpointFailed,
                Some(FailureReason::TerminalFailure { reason }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail() -> VerificationDetail {
        VerificationDetail {
            reason: Some(FailureReason::RetryBudgetExhausted { attempts: 3 }),
            pipeline: PhaseDetail {
                attempts: 3,
                max_attempts: 3,
                last_observed: None,
            },
            endpoint: None,
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(VerificationState::Verified.is_terminal());
        assert!(VerificationState::PipelineFailed.is_terminal());
        assert!(VerificationState::EndpointFailed.is_terminal());
        assert!(!VerificationState::NotStarted.is_terminal());
        assert!(!VerificationState::PollingPipeline.is_terminal());
        assert!(!VerificationState::PollingEndpoint.is_terminal());
    }

    #[test]
    fn test_outcome_summary() {
        let outcome = VerificationOutcome::PipelineFailed(detail());
        let summary = outcome.summary();
        assert!(summary.starts_with("pipeline_failed"));
        assert!(summary.contains("3/3"));
        assert!(summary.contains("retry budget exhausted"));
    }

    #[test]
    fn test_outcome_serializes_with_state_tag() {
        let outcome = VerificationOutcome::PipelineFailed(detail());
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["state"], "pipeline_failed");
        assert_eq!(json["detail"]["reason"]["kind"], "retry_budget_exhausted");
        assert_eq!(json["detail"]["pipeline"]["attempts"], 3);
    }

    #[test]
    fn test_fingerprint_stable() {
        let a = VerificationOutcome::PipelineFailed(detail());
        let b = VerificationOutcome::PipelineFailed(detail());
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);

        let c = VerificationOutcome::EndpointFailed(detail());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
