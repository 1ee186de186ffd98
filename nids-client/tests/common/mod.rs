//! Scripted in-memory backend for orchestration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nids_client::{AnalysisBackend, ChunkUpload, ClientError, Result};
use nids_core::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer to a status query
#[derive(Debug, Clone)]
pub enum StatusStep {
    Status(JobStatus),
    TransportError,
    ApplicationError(u16),
}

impl From<JobStatus> for StatusStep {
    fn from(status: JobStatus) -> Self {
        StatusStep::Status(status)
    }
}

/// Everything the backend was asked, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Chunk(u32),
    Merge(MergeRequest),
    Status(JobId),
    Result(JobId),
}

pub struct ScriptedBackend {
    chunk_delays: HashMap<u32, Duration>,
    failing_chunks: HashSet<u32>,
    failing_files: HashSet<String>,
    merge_fails: bool,
    next_job_id: AtomicU64,
    default_script: Vec<StatusStep>,
    job_scripts: HashMap<JobId, Vec<StatusStep>>,
    scripts: Mutex<HashMap<JobId, VecDeque<StatusStep>>>,
    result_override: Mutex<Option<AnalysisResult>>,
    result_fails: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub stored: Mutex<Vec<ChunkUpload>>,
    pub calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        ScriptedBackend {
            chunk_delays: HashMap::new(),
            failing_chunks: HashSet::new(),
            failing_files: HashSet::new(),
            merge_fails: false,
            next_job_id: AtomicU64::new(1),
            default_script: vec![StatusStep::Status(JobStatus::Completed)],
            job_scripts: HashMap::new(),
            scripts: Mutex::new(HashMap::new()),
            result_override: Mutex::new(None),
            result_fails: false,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            stored: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chunk_delay(mut self, index: u32, delay: Duration) -> Self {
        self.chunk_delays.insert(index, delay);
        self
    }

    pub fn with_failing_chunk(mut self, index: u32) -> Self {
        self.failing_chunks.insert(index);
        self
    }

    /// Reject every chunk of uploads named `filename`
    pub fn with_failing_file(mut self, filename: &str) -> Self {
        self.failing_files.insert(filename.to_string());
        self
    }

    pub fn with_failing_merge(mut self) -> Self {
        self.merge_fails = true;
        self
    }

    pub fn with_failing_result(mut self) -> Self {
        self.result_fails = true;
        self
    }

    /// Status answers for every job; the last one repeats
    pub fn with_statuses(mut self, steps: Vec<StatusStep>) -> Self {
        self.default_script = steps;
        self
    }

    /// Status answers for one job, overriding the shared script
    pub fn with_job_statuses(mut self, job_id: JobId, steps: Vec<StatusStep>) -> Self {
        self.job_scripts.insert(job_id, steps);
        self
    }

    pub fn with_result(self, result: AnalysisResult) -> Self {
        *self.result_override.lock().unwrap() = Some(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn merge_calls(&self) -> Vec<MergeRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Merge(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn status_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Status(_))).count()
    }

    pub fn result_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Result(_))).count()
    }

    pub fn stored_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .stored
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.fields.chunk_index)
            .collect();
        indices.sort_unstable();
        indices
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<()> {
        let index = chunk.fields.chunk_index;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.chunk_delays.get(&index).copied().unwrap_or(Duration::from_millis(1));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(Call::Chunk(index));

        if self.failing_chunks.contains(&index)
            || self.failing_files.contains(chunk.fields.filename.as_str())
        {
            return Err(ClientError::Application {
                status: 500,
                message: format!("Chunk {} failed", index),
            });
        }
        self.stored.lock().unwrap().push(chunk);
        Ok(())
    }

    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse> {
        self.record(Call::Merge(request.clone()));
        if self.merge_fails {
            return Err(ClientError::Application {
                status: 404,
                message: "Chunks not found".to_string(),
            });
        }

        let job_id = JobId(self.next_job_id.fetch_add(1, Ordering::SeqCst));
        let script = self.job_scripts.get(&job_id).unwrap_or(&self.default_script);
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id, script.iter().cloned().collect());
        Ok(MergeResponse {
            job_id,
            message: Some("processing started".to_string()),
        })
    }

    async fn job_status(&self, job_id: JobId) -> Result<StatusResponse> {
        self.record(Call::Status(job_id));

        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts
                .get_mut(&job_id)
                .ok_or_else(|| ClientError::Application {
                    status: 404,
                    message: "Job not found".to_string(),
                })?;
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match step {
            Some(StatusStep::Status(status)) => Ok(StatusResponse {
                status,
                job_id: Some(job_id),
                filename: None,
            }),
            Some(StatusStep::TransportError) => {
                Err(ClientError::Transport("connection reset by peer".to_string()))
            }
            Some(StatusStep::ApplicationError(status)) => Err(ClientError::Application {
                status,
                message: "status check failed".to_string(),
            }),
            None => Err(ClientError::Protocol("empty script".to_string())),
        }
    }

    async fn job_result(&self, job_id: JobId) -> Result<AnalysisResult> {
        self.record(Call::Result(job_id));
        if self.result_fails {
            return Err(ClientError::Application {
                status: 500,
                message: "Failed to parse result data".to_string(),
            });
        }

        if let Some(result) = self.result_override.lock().unwrap().clone() {
            return Ok(result);
        }
        Ok(sample_result(job_id, "capture.pcap"))
    }
}

pub fn sample_result(job_id: JobId, filename: &str) -> AnalysisResult {
    AnalysisResult {
        job_id,
        filename: filename.to_string(),
        status: JobStatus::Completed,
        threats: vec![Threat {
            id: 1,
            kind: "DDoS".to_string(),
            severity: "High".to_string(),
            description: "SYN flood from a single source".to_string(),
            confidence: 0.91,
            source_ip: Some("10.0.0.5".to_string()),
            destination_ip: Some("10.0.0.1".to_string()),
            port: Some(80),
            service: Some("HTTP".to_string()),
        }],
        summary: Summary {
            total_threats: 1,
            risk_score: 80,
            recommendation: "Rate-limit 10.0.0.5".to_string(),
        },
        error: None,
    }
}

/// Write `len` patterned bytes to `name` inside `dir`
pub fn write_source(dir: &tempfile::TempDir, name: &str, len: usize) -> PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}
