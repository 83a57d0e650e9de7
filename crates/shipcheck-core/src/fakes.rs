//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedStatusSource`, `ScriptedProbe`, and `RecordingSleeper`
//! that satisfy the trait contracts without network access or real delays.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{HttpProbe, HttpResponse, PipelineStatusSource, QueryResult};
use crate::error::QueryError;
use crate::sleeper::Sleeper;
use crate::status::PipelineStatus;

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Replays a fixed list of answers; once exhausted, the last answer repeats.
#[derive(Debug)]
struct Script<T> {
    answers: Vec<QueryResult<T>>,
    requests: Mutex<Vec<String>>,
}

impl<T: Clone> Script<T> {
    fn new(answers: Vec<QueryResult<T>>) -> Self {
        Self {
            answers,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn next(&self, request: &str) -> QueryResult<T> {
        let mut requests = self.requests.lock().unwrap();
        let idx = requests.len().min(self.answers.len().saturating_sub(1));
        requests.push(request.to_string());
        self.answers
            .get(idx)
            .cloned()
            .unwrap_or_else(|| Err(QueryError::NotFound("empty script".to_string())))
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// ScriptedStatusSource
// ---------------------------------------------------------------------------

/// Pipeline status source that answers from a script.
#[derive(Debug)]
pub struct ScriptedStatusSource {
    script: Script<PipelineStatus>,
}

impl ScriptedStatusSource {
    pub fn new(answers: Vec<QueryResult<PipelineStatus>>) -> Self {
        Self {
            script: Script::new(answers),
        }
    }

    /// Always answer with the same snapshot.
    pub fn always(status: PipelineStatus) -> Self {
        Self::new(vec![Ok(status)])
    }

    /// Number of `fetch_status` calls so far.
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Pipeline ids requested, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.script.requests()
    }
}

#[async_trait]
impl PipelineStatusSource for ScriptedStatusSource {
    async fn fetch_status(&self, pipeline_id: &str) -> QueryResult<PipelineStatus> {
        self.script.next(pipeline_id)
    }
}

// ---------------------------------------------------------------------------
// ScriptedProbe
// ---------------------------------------------------------------------------

/// HTTP probe that answers from a script.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Script<HttpResponse>,
}

impl ScriptedProbe {
    pub fn new(answers: Vec<QueryResult<HttpResponse>>) -> Self {
        Self {
            script: Script::new(answers),
        }
    }

    /// Answer with these status codes (empty bodies), in order.
    pub fn statuses(codes: &[u16]) -> Self {
        Self::new(
            codes
                .iter()
                .map(|&code| Ok(HttpResponse::new(code, "")))
                .collect(),
        )
    }

    pub fn always(response: HttpResponse) -> Self {
        Self::new(vec![Ok(response)])
    }

    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Addresses requested, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.script.requests()
    }
}

#[async_trait]
impl HttpProbe for ScriptedProbe {
    async fn request(&self, address: &str) -> QueryResult<HttpResponse> {
        self.script.next(address)
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

/// Sleeper that returns immediately and remembers what it was asked.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ExecutionStatus, StageState};

    #[tokio::test]
    async fn test_script_repeats_last_answer() {
        let probe = ScriptedProbe::statuses(&[503, 200]);
        assert_eq!(probe.request("a").await.unwrap().status, 503);
        assert_eq!(probe.request("a").await.unwrap().status, 200);
        assert_eq!(probe.request("a").await.unwrap().status, 200);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_errors() {
        let source = ScriptedStatusSource::new(vec![]);
        assert!(source.fetch_status("p").await.is_err());
        assert_eq!(source.requested(), vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn test_source_always() {
        let status = PipelineStatus::new(
            "p",
            vec![StageState::new("Deploy", ExecutionStatus::Succeeded)],
        );
        let source = ScriptedStatusSource::always(status.clone());
        assert_eq!(source.fetch_status("p").await.unwrap(), status);
        assert_eq!(source.fetch_status("p").await.unwrap(), status);
    }

    #[tokio::test]
    async fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(3)).await;
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(3)]);
        assert_eq!(sleeper.count(), 1);
    }
}
