//! Error types for shipcheck-adapters

use thiserror::Error;

/// Errors raised while building adapters or loading configuration.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Configuration file could not be read
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// An environment override has the wrong shape
    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride { key: String, value: String },

    /// Configuration values rejected by the engine
    #[error(transparent)]
    Verify(#[from] shipcheck_core::VerifyError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Http(err.to_string())
    }
}

/// Result type for adapter construction.
pub type Result<T> = std::result::Result<T, AdapterError>;
