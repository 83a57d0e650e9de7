//! shipcheck - post-deployment verification CLI
//!
//! ## Commands
//!
//! - `verify`: wait for the release pipeline to go green, then for the
//!   deployed endpoint to answer as expected
//! - `status`: print one pipeline status snapshot
//! - `probe`: run the endpoint phase alone
//!
//! Settings come from `shipcheck.toml` (or `--config`), then `SHIPCHECK_*`
//! environment variables, then flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shipcheck_adapters::{ReqwestProbe, ShipcheckConfig};
use shipcheck_core::{
    EndpointObservation, EndpointPoller, PipelineStatusSource, PollOutcome, TokioSleeper,
    VerificationOutcome, Verifier,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "shipcheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify a deployment: pipeline green, endpoint healthy", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and a JSON report
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./shipcheck.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the pipeline, then for the endpoint
    Verify {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Stop at the first failed or stopped stage
        #[arg(long)]
        fail_fast: bool,

        /// Wall-clock limit for the whole run, in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Print the current pipeline status once
    Status {
        /// Pipeline name
        #[arg(short, long)]
        pipeline: String,

        /// Region passed to the status command
        #[arg(long)]
        region: Option<String>,
    },

    /// Poll the endpoint until it answers as expected
    Probe {
        #[command(flatten)]
        endpoint: EndpointArgs,
    },
}

#[derive(Args, Debug, Default)]
struct PipelineArgs {
    /// Pipeline name
    #[arg(short, long)]
    pipeline: String,

    /// Region passed to the status command
    #[arg(long)]
    region: Option<String>,

    /// Pipeline status attempts
    #[arg(long)]
    pipeline_attempts: Option<u32>,

    /// Seconds between pipeline status attempts
    #[arg(long)]
    pipeline_interval_secs: Option<u64>,
}

#[derive(Args, Debug, Default)]
struct EndpointArgs {
    /// Endpoint address (bare host or IP gets http://)
    #[arg(short, long)]
    url: String,

    /// Expected HTTP status
    #[arg(long)]
    expect_status: Option<u16>,

    /// Text the response body must contain
    #[arg(long)]
    expect_body: Option<String>,

    /// Regex the response body must match
    #[arg(long)]
    expect_regex: Option<String>,

    /// Endpoint attempts
    #[arg(long)]
    endpoint_attempts: Option<u32>,

    /// Seconds between endpoint attempts
    #[arg(long)]
    endpoint_interval_secs: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,
}

impl PipelineArgs {
    fn apply(&self, config: &mut ShipcheckConfig) {
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(n) = self.pipeline_attempts {
            config.pipeline.max_attempts = n;
        }
        if let Some(secs) = self.pipeline_interval_secs {
            config.pipeline.interval_secs = secs;
        }
    }
}

impl EndpointArgs {
    fn apply(&self, config: &mut ShipcheckConfig) {
        if let Some(status) = self.expect_status {
            config.expect.status = Some(status);
        }
        if let Some(text) = &self.expect_body {
            config.expect.body_contains = Some(text.clone());
        }
        if let Some(pattern) = &self.expect_regex {
            config.expect.body_regex = Some(pattern.clone());
        }
        if let Some(n) = self.endpoint_attempts {
            config.endpoint.max_attempts = n;
        }
        if let Some(secs) = self.endpoint_interval_secs {
            config.endpoint.interval_secs = secs;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.endpoint.request_timeout_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    shipcheck_core::init_tracing(cli.json, level);

    let mut config =
        ShipcheckConfig::discover(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Verify {
            pipeline,
            endpoint,
            fail_fast,
            deadline_secs,
        } => {
            pipeline.apply(&mut config);
            endpoint.apply(&mut config);
            if fail_fast {
                config.fail_fast = true;
            }
            if deadline_secs.is_some() {
                config.deadline_secs = deadline_secs;
            }
            cmd_verify(&config, &pipeline.pipeline, &endpoint.url, cli.json).await
        }
        Commands::Status { pipeline, region } => {
            if region.is_some() {
                config.region = region;
            }
            cmd_status(&config, &pipeline, cli.json).await
        }
        Commands::Probe { endpoint } => {
            endpoint.apply(&mut config);
            cmd_probe(&config, &endpoint.url, cli.json).await
        }
    }
}

async fn cmd_verify(
    config: &ShipcheckConfig,
    pipeline: &str,
    address: &str,
    json_output: bool,
) -> Result<()> {
    let pipeline_policy = config
        .pipeline_policy()
        .context("Invalid pipeline retry settings")?;
    let endpoint_policy = config
        .endpoint_policy()
        .context("Invalid endpoint retry settings")?;
    let predicate = config.predicate().context("Invalid endpoint expectation")?;

    let source = config.status_source();
    let probe =
        ReqwestProbe::new(config.request_timeout()).context("Failed to build HTTP client")?;
    let sleeper = TokioSleeper;
    let verifier = Verifier::new(&source, &probe, &sleeper)
        .with_stage_failure_mode(config.stage_failure_mode());

    info!(
        pipeline,
        address,
        expect = predicate.description(),
        max_wait_secs = pipeline_policy
            .worst_case_wait()
            .saturating_add(endpoint_policy.worst_case_wait())
            .as_secs(),
        "Verifying deployment"
    );

    let outcome = match config.deadline() {
        Some(deadline) => {
            verifier
                .verify_within(
                    pipeline,
                    address,
                    pipeline_policy,
                    endpoint_policy,
                    &predicate,
                    deadline,
                )
                .await
        }
        None => {
            verifier
                .verify(pipeline, address, pipeline_policy, endpoint_policy, &predicate)
                .await
        }
    };

    print_outcome(&outcome, json_output)?;

    if !outcome.is_verified() {
        anyhow::bail!("Deployment not verified: {}", outcome.state());
    }
    Ok(())
}

fn print_outcome(outcome: &VerificationOutcome, json_output: bool) -> Result<()> {
    let fingerprint = outcome.fingerprint()?;
    if json_output {
        let report = json!({
            "outcome": outcome,
            "fingerprint": fingerprint,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report_lines(outcome, &fingerprint) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Plain-text report: summary, last pipeline snapshot, last endpoint
/// observation, short fingerprint.
fn report_lines(outcome: &VerificationOutcome, fingerprint: &str) -> Vec<String> {
    let detail = outcome.detail();
    let mut lines = vec![outcome.summary()];
    if let Some(last) = &detail.pipeline.last_observed {
        lines.push(format!("Pipeline:    {}", last.summary()));
    }
    if let Some(last) = detail.endpoint.as_ref().and_then(|e| e.last_observed.as_ref()) {
        lines.push(format!("Endpoint:    {}", describe_observation(last)));
    }
    let short = fingerprint.get(..12).unwrap_or(fingerprint);
    lines.push(format!("Fingerprint: {}", short));
    lines
}

fn describe_observation(observation: &EndpointObservation) -> String {
    match observation {
        EndpointObservation::Response {
            status,
            body_snippet,
        } => format!("HTTP {} {:?}", status, body_snippet),
        EndpointObservation::Unreachable { error } => format!("unreachable: {}", error),
    }
}

async fn cmd_status(config: &ShipcheckConfig, pipeline: &str, json_output: bool) -> Result<()> {
    let source = config.status_source();
    let status = source
        .fetch_status(pipeline)
        .await
        .with_context(|| format!("Failed to fetch status of pipeline '{}'", pipeline))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Pipeline: {}", status.pipeline);
        for stage in &status.stages {
            println!("  {:<24} {}", stage.name, stage.status_label());
        }
        println!(
            "{}/{} stage(s) succeeded",
            status.succeeded_count(),
            status.stages.len()
        );
    }
    Ok(())
}

async fn cmd_probe(config: &ShipcheckConfig, address: &str, json_output: bool) -> Result<()> {
    let policy = config
        .endpoint_policy()
        .context("Invalid endpoint retry settings")?;
    let predicate = config.predicate().context("Invalid endpoint expectation")?;
    let probe =
        ReqwestProbe::new(config.request_timeout()).context("Failed to build HTTP client")?;
    let sleeper = TokioSleeper;

    let report = EndpointPoller::new(&probe, &sleeper, policy)
        .run(address, &predicate)
        .await;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let verdict = match &report.outcome {
            PollOutcome::Succeeded => "ok".to_string(),
            PollOutcome::FailedTerminal(reason) => format!("failed: {}", reason),
            PollOutcome::TimedOut(attempts) => format!("timed out after {} attempt(s)", attempts),
        };
        println!(
            "{} ({}/{} attempt(s)): {}",
            address,
            report.attempts,
            policy.max_attempts(),
            verdict
        );
    }

    if !report.succeeded() {
        anyhow::bail!("Endpoint {} did not satisfy: {}", address, predicate.description());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify_flags() {
        let cli = Cli::try_parse_from([
            "shipcheck",
            "--json",
            "verify",
            "--pipeline",
            "web-release",
            "--url",
            "203.0.113.10",
            "--expect-body",
            "Your deployment is working.",
            "--endpoint-attempts",
            "5",
            "--fail-fast",
            "--deadline-secs",
            "900",
        ])
        .expect("parse");

        assert!(cli.json);
        match cli.command {
            Commands::Verify {
                pipeline,
                endpoint,
                fail_fast,
                deadline_secs,
            } => {
                assert_eq!(pipeline.pipeline, "web-release");
                assert_eq!(endpoint.url, "203.0.113.10");
                assert_eq!(endpoint.endpoint_attempts, Some(5));
                assert!(fail_fast);
                assert_eq!(deadline_secs, Some(900));
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_verify_requires_pipeline_and_url() {
        assert!(Cli::try_parse_from(["shipcheck", "verify", "--url", "x"]).is_err());
        assert!(Cli::try_parse_from(["shipcheck", "verify", "--pipeline", "p"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = ShipcheckConfig::from_toml(
            "[endpoint]\nmax_attempts = 3\n\n[expect]\nbody_contains = \"from file\"\n",
        )
        .expect("parse");

        let endpoint = EndpointArgs {
            url: "203.0.113.10".to_string(),
            expect_body: Some("from flag".to_string()),
            endpoint_attempts: Some(8),
            ..Default::default()
        };
        endpoint.apply(&mut config);

        assert_eq!(config.endpoint.max_attempts, 8);
        assert_eq!(config.expect.body_contains.as_deref(), Some("from flag"));
        assert_eq!(config.expect.status, Some(200));
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = ShipcheckConfig::from_toml("[pipeline]\ninterval_secs = 30\n").expect("parse");
        PipelineArgs {
            pipeline: "web-release".to_string(),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.pipeline.interval_secs, 30);
        assert!(config.region.is_none());
    }

    fn endpoint_failed(last: EndpointObservation) -> VerificationOutcome {
        use shipcheck_core::{
            ExecutionStatus, FailureReason, PhaseDetail, PipelineStatus, StageState,
            VerificationDetail,
        };

        VerificationOutcome::EndpointFailed(VerificationDetail {
            reason: Some(FailureReason::RetryBudgetExhausted { attempts: 3 }),
            pipeline: PhaseDetail {
                attempts: 1,
                max_attempts: 60,
                last_observed: Some(PipelineStatus::new(
                    "web-release",
                    vec![StageState::new("Deploy", ExecutionStatus::Succeeded)],
                )),
            },
            endpoint: Some(PhaseDetail {
                attempts: 3,
                max_attempts: 3,
                last_observed: Some(last),
            }),
        })
    }

    #[test]
    fn test_report_shows_last_endpoint_response() {
        let outcome = endpoint_failed(EndpointObservation::Response {
            status: 502,
            body_snippet: "Bad Gateway".to_string(),
        });
        let fingerprint = outcome.fingerprint().expect("fingerprint");
        let lines = report_lines(&outcome, &fingerprint);

        assert!(lines[0].starts_with("endpoint_failed"));
        assert_eq!(lines[1], "Pipeline:    Deploy=Succeeded");
        assert_eq!(lines[2], "Endpoint:    HTTP 502 \"Bad Gateway\"");
        assert_eq!(lines[3], format!("Fingerprint: {}", &fingerprint[..12]));
    }

    #[test]
    fn test_report_shows_unreachable_endpoint() {
        let outcome = endpoint_failed(EndpointObservation::Unreachable {
            error: "transport error: connection refused".to_string(),
        });
        let lines = report_lines(&outcome, "abc");

        assert!(lines
            .iter()
            .any(|l| l == "Endpoint:    unreachable: transport error: connection refused"));
        assert_eq!(lines.last().map(String::as_str), Some("Fingerprint: abc"));
    }

    #[tokio::test]
    async fn test_status_command_with_custom_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shipcheck.toml");
        std::fs::write(
            &path,
            r#"
            [pipeline]
            status_command = ["echo", '{"stageStates":[{"stageName":"Deploy","latestExecution":{"status":"Succeeded"}}]}']
            "#,
        )
        .expect("write config");

        let config = ShipcheckConfig::load(&path).expect("load");
        let result = cmd_status(&config, "web-release", true).await;
        assert!(result.is_ok(), "status failed: {:?}", result.err());
    }

    #[tokio::test]
    async fn test_verify_fails_when_status_command_fails() {
        let mut config = ShipcheckConfig::default();
        config.pipeline.status_command = Some(vec!["false".to_string()]);
        config.pipeline.max_attempts = 2;
        config.pipeline.interval_secs = 0;

        let err = cmd_verify(&config, "web-release", "127.0.0.1:9", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("pipeline_failed"));
    }
}
