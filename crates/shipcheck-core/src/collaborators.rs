//! Collaborator traits consumed by the pollers.
//!
//! - `PipelineStatusSource`: answers "what state is the pipeline in"
//! - `HttpProbe`: issues one request against the deployed endpoint
//!
//! Both are async and know nothing about how the engine retries. In-memory
//! fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::QueryError;
use crate::status::PipelineStatus;

/// Result type for collaborator calls.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Source of pipeline status snapshots.
#[async_trait]
pub trait PipelineStatusSource: Send + Sync {
    /// Fetch a fresh snapshot. An `Err` means the source could not answer,
    /// not that the pipeline is unhealthy.
    async fn fetch_status(&self, pipeline_id: &str) -> QueryResult<PipelineStatus>;
}

/// Status code and body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Issues a single request against an address.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn request(&self, address: &str) -> QueryResult<HttpResponse>;
}
