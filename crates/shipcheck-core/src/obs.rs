//! Structured observability hooks for verification runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via `verify_span`, attached with `Instrument`
//! - Emission functions for each poll attempt and each phase result
//!
//! Events are emitted at `info!` level (filter via `RUST_LOG`).
//! For JSON output, initialise tracing with `json = true`.

use tracing::{info, warn};

use crate::poll::PollOutcome;

/// Longest body excerpt written to a log line or kept in a report.
pub const BODY_SNIPPET_CHARS: usize = 256;

/// Span tagging every event of one verification run with its run id and
/// pipeline.
///
/// Attach it with `tracing::Instrument` rather than entering it, so the run
/// future stays `Send`.
///
/// # Example
///
/// ```ignore
/// verifier_run.instrument(verify_span("6f1c...", "web-release")).await
/// ```
pub fn verify_span(run_id: &str, pipeline: &str) -> tracing::Span {
    tracing::info_span!("shipcheck.verify", run_id = %run_id, pipeline = %pipeline)
}

/// Truncate a body to [`BODY_SNIPPET_CHARS`] characters on a char boundary.
pub fn body_snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

pub fn emit_verify_started(pipeline: &str, address: &str) {
    info!(event = "verify.started", pipeline = %pipeline, address = %address);
}

/// Emit event: one pipeline status attempt evaluated.
pub fn emit_pipeline_attempt(pipeline: &str, attempt: u32, max_attempts: u32, stages: &str) {
    info!(
        event = "pipeline.attempt",
        pipeline = %pipeline,
        attempt = attempt,
        max_attempts = max_attempts,
        stages = %stages,
    );
}

/// Emit event: status query failed, run aborts.
pub fn emit_pipeline_query_failed(pipeline: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "pipeline.query_failed", pipeline = %pipeline, attempt = attempt, error = %error);
}

pub fn emit_pipeline_finished(pipeline: &str, outcome: &PollOutcome, attempts: u32) {
    info!(
        event = "pipeline.finished",
        pipeline = %pipeline,
        outcome = ?outcome,
        attempts = attempts,
    );
}

/// Emit event: endpoint answered.
pub fn emit_endpoint_attempt(
    address: &str,
    attempt: u32,
    max_attempts: u32,
    status: u16,
    body: &str,
) {
    info!(
        event = "endpoint.attempt",
        address = %address,
        attempt = attempt,
        max_attempts = max_attempts,
        status = status,
        body = %body_snippet(body),
    );
}

/// Emit event: endpoint could not be reached (counts as a failed attempt).
pub fn emit_endpoint_unreachable(
    address: &str,
    attempt: u32,
    max_attempts: u32,
    error: &dyn std::fmt::Display,
) {
    info!(
        event = "endpoint.unreachable",
        address = %address,
        attempt = attempt,
        max_attempts = max_attempts,
        error = %error,
    );
}

pub fn emit_endpoint_finished(address: &str, outcome: &PollOutcome, attempts: u32) {
    info!(
        event = "endpoint.finished",
        address = %address,
        outcome = ?outcome,
        attempts = attempts,
    );
}

/// Emit event: verification reached a terminal state.
pub fn emit_verify_finished(state: &str, duration_ms: u64) {
    info!(event = "verify.finished", state = %state, duration_ms = duration_ms);
}
