//! shipcheck core library
//!
//! Post-deployment verification engine:
//! - `StagePoller` waits for every stage of a release pipeline to succeed
//! - `EndpointPoller` waits for the deployed endpoint to satisfy a predicate
//! - `Verifier` runs the two in sequence and reports one terminal outcome
//!
//! The engine talks to the outside world only through the
//! [`PipelineStatusSource`], [`HttpProbe`] and [`Sleeper`] traits.

pub mod collaborators;
pub mod endpoint_poller;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod poll;
pub mod policy;
pub mod predicate;
pub mod sleeper;
pub mod stage_poller;
pub mod status;
pub mod telemetry;
pub mod verifier;

pub use collaborators::{HttpProbe, HttpResponse, PipelineStatusSource, QueryResult};
pub use endpoint_poller::{EndpointObservation, EndpointPoller};
pub use error::{QueryError, Result, StatusQueryFailure, VerifyError};
pub use poll::{PollOutcome, PollReport, PollState};
pub use policy::RetryPolicy;
pub use predicate::Predicate;
pub use sleeper::{Sleeper, TokioSleeper};
pub use stage_poller::StagePoller;
pub use status::{
    evaluate_stages, ExecutionStatus, PipelineStatus, StageFailureMode, StageState, StageVerdict,
};
pub use telemetry::init_tracing;
pub use verifier::{
    FailureReason, PhaseDetail, VerificationDetail, VerificationOutcome, VerificationState,
    Verifier,
};

/// shipcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
