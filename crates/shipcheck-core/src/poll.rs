//! Poll outcome types and the per-run attempt state machine.

use serde::Serialize;

use crate::policy::RetryPolicy;

/// How one polling run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PollOutcome {
    Succeeded,
    /// The target reached a state that will never succeed.
    FailedTerminal(String),
    /// Retry budget exhausted after this many attempts.
    TimedOut(u32),
}

/// Outcome of a polling run plus what it saw last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollReport<T> {
    pub outcome: PollOutcome,
    pub attempts: u32,
    pub last_observed: Option<T>,
}

impl<T> PollReport<T> {
    pub fn succeeded(&self) -> bool {
        self.outcome == PollOutcome::Succeeded
    }
}

/// Attempt counter and last observation for one polling run.
///
/// A poller drives this explicitly: `begin_attempt` before each query,
/// `observe` with what came back, then either `finish` or check
/// `has_remaining` and sleep.
#[derive(Debug, Clone)]
pub struct PollState<T> {
    policy: RetryPolicy,
    attempts: u32,
    last_observed: Option<T>,
}

impl<T> PollState<T> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            last_observed: None,
        }
    }

    /// Start the next attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn observe(&mut self, value: T) {
        self.last_observed = Some(value);
    }

    pub fn has_remaining(&self) -> bool {
        self.attempts < self.policy.max_attempts()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn last_observed(&self) -> Option<&T> {
        self.last_observed.as_ref()
    }

    pub fn finish(self, outcome: PollOutcome) -> PollReport<T> {
        PollReport {
            outcome,
            attempts: self.attempts,
            last_observed: self.last_observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(2, Duration::ZERO).expect("policy");
        let mut state: PollState<u16> = PollState::new(policy);
        assert!(state.has_remaining());

        assert_eq!(state.begin_attempt(), 1);
        state.observe(503);
        assert!(state.has_remaining());

        assert_eq!(state.begin_attempt(), 2);
        state.observe(502);
        assert!(!state.has_remaining());

        let report = state.finish(PollOutcome::TimedOut(2));
        assert_eq!(report.outcome, PollOutcome::TimedOut(2));
        assert_eq!(report.attempts, 2);
        assert_eq!(report.last_observed, Some(502));
        assert!(!report.succeeded());
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(PollOutcome::TimedOut(5)).expect("serialize");
        assert_eq!(json["kind"], "timed_out");
        assert_eq!(json["detail"], 5);
    }
}
