//! Stage-aggregation poller: wait until every pipeline stage has succeeded.

use crate::collaborators::PipelineStatusSource;
use crate::error::StatusQueryFailure;
use crate::obs;
use crate::poll::{PollOutcome, PollReport, PollState};
use crate::policy::RetryPolicy;
use crate::sleeper::Sleeper;
use crate::status::{evaluate_stages, PipelineStatus, StageFailureMode, StageVerdict};

/// Polls a [`PipelineStatusSource`] until all stages succeed or the retry
/// budget runs out.
///
/// A failed status query is not retried: it aborts the run with a
/// [`StatusQueryFailure`] without consuming further attempts.
pub struct StagePoller<'a> {
    source: &'a dyn PipelineStatusSource,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    mode: StageFailureMode,
}

impl<'a> StagePoller<'a> {
    pub fn new(
        source: &'a dyn PipelineStatusSource,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            sleeper,
            policy,
            mode: StageFailureMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: StageFailureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Poll with fresh state.
    pub async fn run(
        &self,
        pipeline_id: &str,
    ) -> Result<PollReport<PipelineStatus>, StatusQueryFailure> {
        let mut state = PollState::new(self.policy);
        let outcome = self.drive(pipeline_id, &mut state).await?;
        Ok(state.finish(outcome))
    }

    /// Poll, recording progress into a caller-owned state.
    ///
    /// Returns the outcome once the run is over. `state` stays readable if
    /// the future is dropped part-way (outer deadline).
    pub async fn drive(
        &self,
        pipeline_id: &str,
        state: &mut PollState<PipelineStatus>,
    ) -> Result<PollOutcome, StatusQueryFailure> {
        let max_attempts = self.policy.max_attempts();
        loop {
            let attempt = state.begin_attempt();

            let snapshot = match self.source.fetch_status(pipeline_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    obs::emit_pipeline_query_failed(pipeline_id, attempt, &e);
                    return Err(StatusQueryFailure {
                        pipeline: pipeline_id.to_string(),
                        attempt,
                        last_observed: state.last_observed().cloned(),
                        source: e,
                    });
                }
            };

            obs::emit_pipeline_attempt(pipeline_id, attempt, max_attempts, &snapshot.summary());
            let verdict = evaluate_stages(&snapshot, self.mode);
            state.observe(snapshot);

            let outcome = match verdict {
                StageVerdict::Succeeded => Some(PollOutcome::Succeeded),
                StageVerdict::Failed(reason) => Some(PollOutcome::FailedTerminal(reason)),
                StageVerdict::Pending if !state.has_remaining() => {
                    Some(PollOutcome::TimedOut(attempt))
                }
                StageVerdict::Pending => None,
            };

            if let Some(outcome) = outcome {
                obs::emit_pipeline_finished(pipeline_id, &outcome, attempt);
                return Ok(outcome);
            }

            self.sleeper.sleep(self.policy.interval()).await;
        }
    }
}
