//! shipcheck adapters
//!
//! Real collaborators for the verification engine and the configuration that
//! wires them together.

pub mod command_source;
pub mod config;
pub mod error;
pub mod http_probe;

pub use command_source::{parse_pipeline_state, CommandStatusSource, DEFAULT_COMMAND_TIMEOUT};
pub use config::{
    EndpointSettings, ExpectSettings, PipelineSettings, PollSettings, ShipcheckConfig,
    DEFAULT_CONFIG_FILE,
};
pub use error::{AdapterError, Result};
pub use http_probe::{endpoint_url, ReqwestProbe, DEFAULT_REQUEST_TIMEOUT};
