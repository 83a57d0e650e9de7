//! Verification configuration.
//!
//! Layered lowest to highest: built-in defaults, a TOML file
//! (`shipcheck.toml`), `SHIPCHECK_*` environment variables. The CLI applies
//! its flags on top.
//!
//! ```toml
//! fail_fast = false
//! deadline_secs = 900
//! region = "us-east-1"
//!
//! [pipeline]
//! max_attempts = 60
//! interval_secs = 10
//!
//! [endpoint]
//! max_attempts = 30
//! interval_secs = 10
//! request_timeout_secs = 10
//!
//! [expect]
//! status = 200
//! body_contains = "Your deployment is working."
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shipcheck_core::{Predicate, RetryPolicy, StageFailureMode, VerifyError};

use crate::command_source::{CommandStatusSource, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{AdapterError, Result};
use crate::http_probe::DEFAULT_REQUEST_TIMEOUT;

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "shipcheck.toml";

/// Retry settings for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl PollSettings {
    pub fn policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.interval_secs),
        )?)
    }
}

impl From<RetryPolicy> for PollSettings {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts(),
            interval_secs: policy.interval().as_secs(),
        }
    }
}

/// Pipeline phase settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
    /// Per-invocation timeout of the status command.
    pub command_timeout_secs: u64,
    /// Custom status command; `{pipeline}` and `{region}` are substituted.
    pub status_command: Option<Vec<String>>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let poll = PollSettings::from(RetryPolicy::pipeline_default());
        Self {
            max_attempts: poll.max_attempts,
            interval_secs: poll.interval_secs,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            status_command: None,
        }
    }
}

/// Endpoint phase settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        let poll = PollSettings::from(RetryPolicy::endpoint_default());
        Self {
            max_attempts: poll.max_attempts,
            interval_secs: poll.interval_secs,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

/// What a passing response looks like. All set fields must hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpectSettings {
    pub status: Option<u16>,
    pub body_contains: Option<String>,
    pub body_regex: Option<String>,
}

impl Default for ExpectSettings {
    fn default() -> Self {
        Self {
            status: Some(200),
            body_contains: None,
            body_regex: None,
        }
    }
}

impl ExpectSettings {
    pub fn predicate(&self) -> Result<Predicate> {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(Predicate::status_is(status));
        }
        if let Some(text) = &self.body_contains {
            parts.push(Predicate::body_contains(text.clone()));
        }
        if let Some(pattern) = &self.body_regex {
            parts.push(Predicate::body_matches(pattern)?);
        }

        parts
            .into_iter()
            .reduce(Predicate::and)
            .ok_or_else(|| {
                VerifyError::InvalidPredicate(
                    "no expectation configured (status, body_contains or body_regex)"
                        .to_string(),
                )
                .into()
            })
    }
}

/// Full verification configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShipcheckConfig {
    /// Stop at the first failed or stopped stage instead of waiting out the
    /// pipeline budget.
    pub fail_fast: bool,
    /// Wall-clock limit over the whole run.
    pub deadline_secs: Option<u64>,
    /// Region passed to the status command.
    pub region: Option<String>,
    pub pipeline: PipelineSettings,
    pub endpoint: EndpointSettings,
    pub expect: ExpectSettings,
}

impl ShipcheckConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AdapterError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load `path` if given, else `shipcheck.toml` if present, else defaults;
    /// then apply environment overrides.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        base.with_env()
    }

    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup.
    ///
    /// Keys: `SHIPCHECK_PIPELINE_ATTEMPTS`, `SHIPCHECK_PIPELINE_INTERVAL_SECS`,
    /// `SHIPCHECK_ENDPOINT_ATTEMPTS`, `SHIPCHECK_ENDPOINT_INTERVAL_SECS`,
    /// `SHIPCHECK_REQUEST_TIMEOUT_SECS`, `SHIPCHECK_EXPECT_STATUS`,
    /// `SHIPCHECK_EXPECT_BODY`, `SHIPCHECK_EXPECT_REGEX`, `SHIPCHECK_DEADLINE_SECS`,
    /// `SHIPCHECK_FAIL_FAST`, and `SHIPCHECK_REGION` (falling back to
    /// `AWS_REGION`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parsed(&lookup, "SHIPCHECK_PIPELINE_ATTEMPTS")? {
            self.pipeline.max_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_PIPELINE_INTERVAL_SECS")? {
            self.pipeline.interval_secs = v;
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_ENDPOINT_ATTEMPTS")? {
            self.endpoint.max_attempts = v;
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_ENDPOINT_INTERVAL_SECS")? {
            self.endpoint.interval_secs = v;
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_REQUEST_TIMEOUT_SECS")? {
            self.endpoint.request_timeout_secs = v;
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_EXPECT_STATUS")? {
            self.expect.status = Some(v);
        }
        if let Some(v) = lookup("SHIPCHECK_EXPECT_BODY") {
            self.expect.body_contains = Some(v);
        }
        if let Some(v) = lookup("SHIPCHECK_EXPECT_REGEX") {
            self.expect.body_regex = Some(v);
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_DEADLINE_SECS")? {
            self.deadline_secs = Some(v);
        }
        if let Some(v) = parsed(&lookup, "SHIPCHECK_FAIL_FAST")? {
            self.fail_fast = v;
        }
        if let Some(v) = lookup("SHIPCHECK_REGION").or_else(|| lookup("AWS_REGION")) {
            self.region = Some(v);
        }
        Ok(self)
    }

    pub fn pipeline_policy(&self) -> Result<RetryPolicy> {
        PollSettings {
            max_attempts: self.pipeline.max_attempts,
            interval_secs: self.pipeline.interval_secs,
        }
        .policy()
    }

    pub fn endpoint_policy(&self) -> Result<RetryPolicy> {
        PollSettings {
            max_attempts: self.endpoint.max_attempts,
            interval_secs: self.endpoint.interval_secs,
        }
        .policy()
    }

    pub fn predicate(&self) -> Result<Predicate> {
        self.expect.predicate()
    }

    pub fn stage_failure_mode(&self) -> StageFailureMode {
        if self.fail_fast {
            StageFailureMode::FailFast
        } else {
            StageFailureMode::WaitForSuccess
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.request_timeout_secs)
    }

    /// Build the status source described by this config.
    pub fn status_source(&self) -> CommandStatusSource {
        let source = match &self.pipeline.status_command {
            Some(command) => {
                CommandStatusSource::new(command.clone()).with_region(self.region.clone())
            }
            None => CommandStatusSource::aws_cli(self.region.clone()),
        };
        source.with_timeout(Duration::from_secs(self.pipeline.command_timeout_secs))
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AdapterError::InvalidOverride {
                key: key.to_string(),
                value,
            }),
    }
}
