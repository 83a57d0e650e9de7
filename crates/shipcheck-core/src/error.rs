//! Error taxonomy for the verification engine.
//!
//! "Not ready yet" is never an error here: pollers model it as a
//! [`PollOutcome`](crate::poll::PollOutcome). Errors are reserved for
//! invalid configuration and for collaborators that fail to answer.

use thiserror::Error;

use crate::status::PipelineStatus;

/// Failure reported by a collaborator (status source or HTTP probe).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Connection refused, DNS failure, request timeout, ...
    #[error("transport error: {0}")]
    Transport(String),

    /// The pipeline (or other queried resource) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator answered with something that could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// An external command backing the collaborator failed.
    #[error("command failed: {0}")]
    Command(String),
}

/// Errors produced by the verification engine itself.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, VerifyError>;

/// A pipeline status query failed mid-run.
///
/// Carries the attempt on which the failure happened and the last snapshot
/// fetched before it, so the caller can report progress without re-running.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("status query for pipeline '{pipeline}' failed on attempt {attempt}: {source}")]
pub struct StatusQueryFailure {
    pub pipeline: String,
    pub attempt: u32,
    pub last_observed: Option<PipelineStatus>,
    #[source]
    pub source: QueryError,
}
