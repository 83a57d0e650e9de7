//! Suspension between poll attempts.
//!
//! Pollers never call `tokio::time::sleep` directly; they go through a
//! [`Sleeper`] so tests can substitute a recorder and run without real delays.

use std::time::Duration;

use async_trait::async_trait;

/// Suspends the current verification run.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
///
/// Only the calling task is suspended. Dropping the future (for example when
/// an outer deadline fires) cancels the sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_advances_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(10)).await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        TokioSleeper.sleep(Duration::ZERO).await;
    }
}
