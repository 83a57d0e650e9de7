//! Retry budget for a single poller.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, VerifyError};

/// How many times a poller may try, and how long it waits in between.
///
/// Owned by the caller and passed by value into each poller; pollers never
/// mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    #[serde(serialize_with = "duration_millis::serialize", rename = "interval_ms")]
    interval: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` must be at least one.
    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(VerifyError::InvalidPolicy(
                "max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            interval,
        })
    }

    /// Pipeline default: 60 attempts, 10 seconds apart.
    pub fn pipeline_default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(10),
        }
    }

    /// Endpoint default: 30 attempts, 10 seconds apart.
    pub fn endpoint_default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(10),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Upper bound on time spent sleeping if every attempt fails.
    /// Saturates at `Duration::MAX`.
    pub fn worst_case_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts - 1)
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_attempts_rejected() {
        let err = RetryPolicy::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_zero_interval_allowed() {
        let policy = RetryPolicy::new(3, Duration::ZERO).expect("policy");
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.interval(), Duration::ZERO);
        assert_eq!(policy.worst_case_wait(), Duration::ZERO);
    }

    #[test]
    fn test_worst_case_wait() {
        let policy = RetryPolicy::new(30, Duration::from_secs(10)).expect("policy");
        assert_eq!(policy.worst_case_wait(), Duration::from_secs(290));
    }

    #[test]
    fn test_worst_case_wait_saturates() {
        let policy =
            RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2)).expect("policy");
        assert_eq!(policy.worst_case_wait(), Duration::MAX);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(RetryPolicy::pipeline_default().max_attempts(), 60);
        assert_eq!(RetryPolicy::endpoint_default().max_attempts(), 30);
        assert_eq!(
            RetryPolicy::endpoint_default().interval(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_serializes_interval_as_millis() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1500)).expect("policy");
        let json = serde_json::to_value(policy).expect("serialize");
        assert_eq!(json["max_attempts"], 5);
        assert_eq!(json["interval_ms"], 1500);
    }
}
