//! nids-upload: send a capture file to a NIDS analysis service and print the verdict

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nids_client::{HttpBackend, HttpBackendConfig, Orchestrator, SessionOutcome, TransferConfig};
use nids_core::{PollErrorPolicy, SessionStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PollErrors {
    /// Stop polling on the first failed status check
    Abort,
    /// Back off and retry failed status checks
    Retry,
}

#[derive(Debug, Parser)]
#[command(name = "nids-upload", version, about = "Upload a traffic capture for intrusion analysis")]
struct Args {
    /// Capture file to analyse
    file: PathBuf,

    /// Analysis service base URL
    #[arg(long, env = "NIDS_BASE_URL", default_value = "http://127.0.0.1:8000")]
    base_url: String,

    /// Bearer token for the analysis service
    #[arg(long, env = "NIDS_TOKEN", hide_env_values = true)]
    token: String,

    /// Chunk size in MiB
    #[arg(long, env = "NIDS_CHUNK_SIZE_MIB", default_value_t = 100)]
    chunk_size_mib: u64,

    /// Chunk transfers in flight at once
    #[arg(long, env = "NIDS_MAX_CONCURRENT_CHUNKS", default_value_t = 4)]
    max_concurrent_chunks: usize,

    /// Seconds between job status checks
    #[arg(long, env = "NIDS_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,

    /// Give up on a job after this many minutes; 0 waits forever
    #[arg(long, env = "NIDS_MAX_JOB_MINUTES", default_value_t = 60)]
    max_job_minutes: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "NIDS_REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    request_timeout_secs: u64,

    /// What to do when a status check fails
    #[arg(long, env = "NIDS_POLL_ERRORS", value_enum, default_value_t = PollErrors::Retry)]
    poll_errors: PollErrors,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn transfer_config(&self) -> TransferConfig {
        let max_job_duration = match self.max_job_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
        };
        let poll_error_policy = match self.poll_errors {
            PollErrors::Abort => PollErrorPolicy::Abort,
            PollErrors::Retry => PollErrorPolicy::default(),
        };

        TransferConfig {
            chunk_size: self.chunk_size_mib.saturating_mul(MIB),
            max_concurrent_chunks: self.max_concurrent_chunks,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_job_duration,
            poll_error_policy,
        }
    }

    fn backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig::new(self.base_url.clone(), self.token.clone())
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!("Starting nids-upload against {}", args.base_url);

    let backend = HttpBackend::new(args.backend_config()).context("invalid backend settings")?;
    let orchestrator = Orchestrator::new(Arc::new(backend), args.transfer_config())
        .context("invalid transfer settings")?;

    let mut updates = orchestrator.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().clone();
            if status != SessionStatus::Idle {
                info!("{}", status.status_text());
            }
        }
    });

    let outcome = orchestrator.analyze_file(&args.file).await;
    drop(orchestrator);
    let _ = reporter.await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Analysis of {} did not finish: {}", args.file.display(), e);
            return Err(e).with_context(|| format!("analysing {}", args.file.display()));
        }
    };

    let code = match &outcome {
        SessionOutcome::Completed(result) => {
            info!(
                "{} threats found, risk score {}",
                result.summary.total_threats, result.summary.risk_score
            );
            ExitCode::SUCCESS
        }
        SessionOutcome::Failed(result) => {
            warn!("{}", result.error.as_deref().unwrap_or("Analysis failed"));
            ExitCode::from(2)
        }
    };

    let json = serde_json::to_string_pretty(outcome.result()).context("encoding result")?;
    println!("{}", json);
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_map_to_config() {
        let args = Args::try_parse_from([
            "nids-upload",
            "capture.pcap",
            "--token",
            "secret",
            "--base-url",
            "http://analysis.local:9000",
            "--chunk-size-mib",
            "8",
            "--max-job-minutes",
            "0",
            "--poll-errors",
            "abort",
        ])
        .unwrap();

        let transfer = args.transfer_config();
        assert_eq!(transfer.chunk_size, 8 * MIB);
        assert_eq!(transfer.max_job_duration, None);
        assert_eq!(transfer.poll_error_policy, PollErrorPolicy::Abort);
        assert_eq!(transfer.max_concurrent_chunks, 4);

        let backend = args.backend_config();
        assert_eq!(backend.base_url, "http://analysis.local:9000");
        assert_eq!(backend.bearer_token, "secret");
        assert_eq!(backend.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_huge_job_limit_saturates() {
        let max = u64::MAX.to_string();
        let args = Args::try_parse_from([
            "nids-upload",
            "a.pcap",
            "--token",
            "t",
            "--max-job-minutes",
            max.as_str(),
            "--chunk-size-mib",
            max.as_str(),
        ])
        .unwrap();

        let transfer = args.transfer_config();
        assert_eq!(transfer.max_job_duration, Some(Duration::from_secs(u64::MAX)));
        assert_eq!(transfer.chunk_size, u64::MAX);
        assert!(transfer.validate().is_ok());
        assert!(transfer.poll_budget().is_some());
    }

    #[test]
    fn test_defaults_follow_transfer_defaults() {
        let args = Args::try_parse_from(["nids-upload", "a.pcap", "--token", "t"]).unwrap();
        let transfer = args.transfer_config();
        let defaults = TransferConfig::default();

        assert_eq!(transfer.chunk_size, defaults.chunk_size);
        assert_eq!(transfer.poll_interval, defaults.poll_interval);
        assert_eq!(transfer.max_job_duration, defaults.max_job_duration);
        assert_eq!(transfer.poll_error_policy, defaults.poll_error_policy);
    }
}
