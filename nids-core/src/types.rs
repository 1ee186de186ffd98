//! Core data types for NIDS uploads and analysis jobs

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Message attached to a failure result when the backend reports a failed job
pub const JOB_FAILED_MESSAGE: &str = "Analysis failed. Please try again.";

/// Message attached to a failure result when a completed job's result cannot be fetched
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch analysis result";

/// Recommendation used when the backend omits the summary
pub const NO_ANALYSIS_RECOMMENDATION: &str = "No analysis available";

/// Client-generated token grouping all chunks of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Generate a fresh random (v4, 122 random bits) upload id
    pub fn generate() -> Self {
        UploadId(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id with validation
    pub fn new(id: &str) -> crate::Result<Self> {
        if id.is_empty() {
            return Err(crate::NidsError::InvalidUploadId("empty id".to_string()));
        }

        // Ids end up in form fields and server-side directory names
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(crate::NidsError::InvalidUploadId(format!(
                "invalid characters in '{}'",
                id
            )));
        }

        Ok(UploadId(id.to_string()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Original file name, passed through to the backend unmodified
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filename(String);

impl Filename {
    /// Create a filename with validation
    pub fn new(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::NidsError::InvalidFilename("empty name".to_string()));
        }

        if name.chars().any(|c| c.is_control()) {
            return Err(crate::NidsError::InvalidFilename(
                "control characters not allowed".to_string(),
            ));
        }

        Ok(Filename(name.to_string()))
    }

    /// Take the final path component as the filename
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let name = path
            .file_name()
            .ok_or_else(|| {
                crate::NidsError::InvalidFilename(format!("no file name in '{}'", path.display()))
            })?
            .to_str()
            .ok_or_else(|| {
                crate::NidsError::InvalidFilename(format!(
                    "file name is not valid UTF-8: '{}'",
                    path.display()
                ))
            })?;

        Self::new(name)
    }

    /// Get the filename as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Filename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-owned analysis job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a backend analysis job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted but not started; the backend reports this as `pending` right after a merge
    #[serde(alias = "pending")]
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` admit no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::NidsError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "queued" | "pending" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::NidsError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected threat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawThreat")]
pub struct Threat {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub description: String,
    pub confidence: f64,
    #[serde(rename = "sourceIP")]
    pub source_ip: Option<String>,
    #[serde(rename = "destinationIP")]
    pub destination_ip: Option<String>,
    pub port: Option<u16>,
    /// Service label split off a port like `"80 (HTTP)"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// Threat as the backend may send it: `port` is an integer, a numeric string
/// or a labelled string
#[derive(Deserialize)]
struct RawThreat {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
    severity: String,
    description: String,
    confidence: f64,
    #[serde(rename = "sourceIP", default)]
    source_ip: Option<String>,
    #[serde(rename = "destinationIP", default)]
    destination_ip: Option<String>,
    #[serde(default)]
    port: Option<serde_json::Value>,
    #[serde(default)]
    service: Option<String>,
}

impl From<RawThreat> for Threat {
    fn from(raw: RawThreat) -> Self {
        let (port, label) = match raw.port {
            Some(value) => parse_port_and_service(&value),
            None => (None, None),
        };

        Threat {
            id: raw.id,
            kind: raw.kind,
            severity: raw.severity,
            description: raw.description,
            confidence: raw.confidence,
            source_ip: raw.source_ip,
            destination_ip: raw.destination_ip,
            port,
            service: raw.service.or(label),
        }
    }
}

/// Split a port value such as `443`, `"8080"` or `"80 (HTTP)"`
pub fn parse_port_and_service(value: &serde_json::Value) -> (Option<u16>, Option<String>) {
    match value {
        serde_json::Value::Number(n) => (n.as_u64().and_then(|p| u16::try_from(p).ok()), None),
        serde_json::Value::String(s) => {
            let trimmed = s.trim_start();
            let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
            let port = digits.parse::<u16>().ok();

            let service = s.find('(').and_then(|open| {
                let rest = &s[open + 1..];
                rest.find(')')
                    .map(|close| rest[..close].trim().to_string())
                    .filter(|label| !label.is_empty())
            });

            (port, service)
        }
        _ => (None, None),
    }
}

/// Aggregate verdict for one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "totalThreats")]
    pub total_threats: u32,
    #[serde(rename = "riskScore")]
    pub risk_score: u32,
    pub recommendation: String,
}

impl Default for Summary {
    fn default() -> Self {
        Summary {
            total_threats: 0,
            risk_score: 0,
            recommendation: NO_ANALYSIS_RECOMMENDATION.to_string(),
        }
    }
}

/// Final payload of an analysis job, fetched or synthesised locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: JobId,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default)]
    pub threats: Vec<Threat>,
    #[serde(default)]
    pub summary: Summary,
    /// Present only on locally synthesised failure results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Build a failure result without contacting the backend
    pub fn failure(job_id: JobId, filename: &str, error: impl Into<String>) -> Self {
        AnalysisResult {
            job_id,
            filename: filename.to_string(),
            status: JobStatus::Failed,
            threats: Vec::new(),
            summary: Summary::default(),
            error: Some(error.into()),
        }
    }

    /// Check value ranges the wire format cannot express
    pub fn validate(&self) -> crate::Result<()> {
        for threat in &self.threats {
            if !(0.0..=1.0).contains(&threat.confidence) {
                return Err(crate::NidsError::InvalidResult(format!(
                    "threat {} confidence {} outside [0, 1]",
                    threat.id, threat.confidence
                )));
            }
        }

        if self.summary.risk_score > 100 {
            return Err(crate::NidsError::InvalidResult(format!(
                "risk score {} outside [0, 100]",
                self.summary.risk_score
            )));
        }

        Ok(())
    }
}

/// Body of the reassembly request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub filename: Filename,
    #[serde(rename = "uploadId")]
    pub upload_id: UploadId,
}

/// Reassembly response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub message: Option<String>,
}

/// Job status query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Observable state of one analysis session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Idle,
    Uploading { completed: u32, total: u32 },
    Merging,
    Processing { job_id: JobId, status: JobStatus },
    Completed(AnalysisResult),
    Failed { message: String, result: Option<AnalysisResult> },
    /// Polling stopped without a terminal status
    Aborted { job_id: JobId },
}

impl SessionStatus {
    /// Short text for a progress line
    pub fn status_text(&self) -> String {
        match self {
            SessionStatus::Idle => String::new(),
            SessionStatus::Uploading { completed: 0, .. } => "Uploading in chunks...".to_string(),
            SessionStatus::Uploading { completed, total } => {
                format!("Uploading... {}/{}", completed, total)
            }
            SessionStatus::Merging => "Merging chunks...".to_string(),
            SessionStatus::Processing { status: JobStatus::Queued, .. } => {
                "Processing started...".to_string()
            }
            SessionStatus::Processing { status, .. } => status.to_string(),
            SessionStatus::Completed(result) => result.status.to_string(),
            SessionStatus::Failed { message, .. } => message.clone(),
            SessionStatus::Aborted { job_id } => {
                format!("Lost track of job {}; outcome unknown", job_id)
            }
        }
    }

    /// True while a session still has work in flight
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Uploading { .. } | SessionStatus::Merging | SessionStatus::Processing { .. }
        )
    }
}
