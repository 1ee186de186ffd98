//! Client configuration

use crate::{ClientError, Result};
use hyper::Uri;
use nids_core::{poll_budget, JobId, PollErrorPolicy, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL};
use std::time::Duration;

/// Default number of chunk transfers in flight at once
pub const DEFAULT_MAX_CONCURRENT_CHUNKS: usize = 4;

/// Default per-request timeout; large enough for one 100 MiB chunk on a slow link
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default upper bound on how long a job is polled
pub const DEFAULT_MAX_JOB_DURATION: Duration = Duration::from_secs(60 * 60);

/// How a session splits, transfers, and tracks a file
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    pub chunk_size: u64,
    pub max_concurrent_chunks: usize,
    pub poll_interval: Duration,
    /// `None` polls until a terminal status, however long that takes
    pub max_job_duration: Option<Duration>,
    pub poll_error_policy: PollErrorPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_job_duration: Some(DEFAULT_MAX_JOB_DURATION),
            poll_error_policy: PollErrorPolicy::default(),
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ClientError::Config("chunk_size must be positive".to_string()));
        }
        if self.max_concurrent_chunks == 0 {
            return Err(ClientError::Config(
                "max_concurrent_chunks must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll_interval must be positive".to_string()));
        }
        if let PollErrorPolicy::Retry { base_delay, max_delay, .. } = self.poll_error_policy {
            if base_delay.is_zero() || max_delay < base_delay {
                return Err(ClientError::Config(format!(
                    "retry delays must satisfy 0 < base ({:?}) <= max ({:?})",
                    base_delay, max_delay
                )));
            }
        }
        Ok(())
    }

    /// Status queries allowed before the job is given up on
    pub fn poll_budget(&self) -> Option<u32> {
        self.max_job_duration
            .map(|max| poll_budget(max, self.poll_interval))
    }
}

/// Backend endpoint paths; `{job_id}` is substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub upload_chunk: String,
    pub merge: String,
    pub status: String,
    pub result: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            upload_chunk: "/upload-chunk".to_string(),
            merge: "/merge-chunks".to_string(),
            status: "/status/{job_id}".to_string(),
            result: "/result/{job_id}".to_string(),
        }
    }
}

impl Endpoints {
    pub fn status_path(&self, job_id: JobId) -> String {
        self.status.replace("{job_id}", &job_id.to_string())
    }

    pub fn result_path(&self, job_id: JobId) -> String {
        self.result.replace("{job_id}", &job_id.to_string())
    }
}

/// Where and how the HTTP backend is reached
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub request_timeout: Duration,
    pub endpoints: Endpoints,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        HttpBackendConfig {
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoints: Endpoints::default(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let uri: Uri = self
            .base_url
            .parse()
            .map_err(|e| ClientError::Config(format!("Invalid URL: {}", e)))?;

        if !matches!(uri.scheme_str(), Some("http") | Some("https")) {
            return Err(ClientError::Config(format!(
                "unsupported scheme in '{}': expected http or https",
                self.base_url
            )));
        }
        if uri.host().is_none() {
            return Err(ClientError::Config(format!("no host in '{}'", self.base_url)));
        }
        if self.bearer_token.trim().is_empty() {
            return Err(ClientError::Config("bearer token is required".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::Config("request_timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Join the base URL and an endpoint path
    pub fn url(&self, path: &str) -> Result<Uri> {
        let full = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        full.parse()
            .map_err(|e| ClientError::Config(format!("Invalid URL '{}': {}", full, e)))
    }
}
