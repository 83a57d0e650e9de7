//! Predicate-based endpoint poller: wait until the deployed endpoint answers
//! the way the caller expects.

use serde::Serialize;

use crate::collaborators::HttpProbe;
use crate::obs;
use crate::poll::{PollOutcome, PollReport, PollState};
use crate::policy::RetryPolicy;
use crate::predicate::Predicate;
use crate::sleeper::Sleeper;

/// What a single probe attempt saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointObservation {
    /// The endpoint answered; the body is truncated for reporting.
    Response { status: u16, body_snippet: String },
    /// The request itself failed (refused, DNS, timeout, ...).
    Unreachable { error: String },
}

/// Polls an [`HttpProbe`] until the [`Predicate`] accepts a response or the
/// retry budget runs out.
///
/// The predicate is the only success criterion. Transport failures count as
/// failed attempts and are retried like any other miss.
pub struct EndpointPoller<'a> {
    probe: &'a dyn HttpProbe,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
}

impl<'a> EndpointPoller<'a> {
    pub fn new(probe: &'a dyn HttpProbe, sleeper: &'a dyn Sleeper, policy: RetryPolicy) -> Self {
        Self {
            probe,
            sleeper,
            policy,
        }
    }

    /// Poll with fresh state.
    pub async fn run(&self, address: &str, predicate: &Predicate) -> PollReport<EndpointObservation> {
        let mut state = PollState::new(self.policy);
        let outcome = self.drive(address, predicate, &mut state).await;
        state.finish(outcome)
    }

    /// Poll, recording progress into a caller-owned state.
    pub async fn drive(
        &self,
        address: &str,
        predicate: &Predicate,
        state: &mut PollState<EndpointObservation>,
    ) -> PollOutcome {
        let max_attempts = self.policy.max_attempts();
        loop {
            let attempt = state.begin_attempt();

            let passed = match self.probe.request(address).await {
                Ok(response) => {
                    obs::emit_endpoint_attempt(
                        address,
                        attempt,
                        max_attempts,
                        response.status,
                        &response.body,
                    );
                    let passed = predicate.evaluate(response.status, &response.body);
                    state.observe(EndpointObservation::Response {
                        status: response.status,
                        body_snippet: obs::body_snippet(&response.body),
                    });
                    passed
                }
                Err(e) => {
                    obs::emit_endpoint_unreachable(address, attempt, max_attempts, &e);
                    state.observe(EndpointObservation::Unreachable {
                        error: e.to_string(),
                    });
                    false
                }
            };

            if passed || !state.has_remaining() {
                let outcome = if passed {
                    PollOutcome::Succeeded
                } else {
                    PollOutcome::TimedOut(attempt)
                };
                obs::emit_endpoint_finished(address, &outcome, attempt);
                return outcome;
            }

            self.sleeper.sleep(self.policy.interval()).await;
        }
    }
}
