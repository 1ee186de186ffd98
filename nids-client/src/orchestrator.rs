//! Session orchestration: split, transfer, merge, poll, fetch
//!
//! The orchestrator owns the session state and publishes every transition on
//! a watch channel; presentation code subscribes instead of holding state of
//! its own. Starting a session cancels the previous one.

use crate::backend::AnalysisBackend;
use crate::dispatcher::ChunkDispatcher;
use crate::fetcher::ResultFetcher;
use crate::merge::MergeTrigger;
use crate::poller::{JobPoller, PollOutcome};
use crate::{ClientError, Result, TransferConfig};
use nids_core::{AnalysisResult, ChunkPlan, Filename, JobStatus, SessionStatus, UploadSession};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const UPLOAD_FAILED_MESSAGE: &str = "Upload failed. Please try again.";
const MERGE_FAILED_MESSAGE: &str = "Failed to merge chunks";

/// How a session that got as far as an analysis job ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Result fetched from the backend
    Completed(AnalysisResult),
    /// Job failed, could not be tracked, or its result could not be fetched;
    /// the result is synthesised locally
    Failed(AnalysisResult),
}

impl SessionOutcome {
    pub fn result(&self) -> &AnalysisResult {
        match self {
            SessionOutcome::Completed(result) | SessionOutcome::Failed(result) => result,
        }
    }

    pub fn into_result(self) -> AnalysisResult {
        match self {
            SessionOutcome::Completed(result) | SessionOutcome::Failed(result) => result,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }
}

pub struct Orchestrator {
    backend: Arc<dyn AnalysisBackend>,
    config: TransferConfig,
    status: watch::Sender<SessionStatus>,
    active: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: TransferConfig) -> Result<Self> {
        config.validate()?;
        let (status, _) = watch::channel(SessionStatus::Idle);

        Ok(Orchestrator {
            backend,
            config,
            status,
            active: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Receive every published session state
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Latest published state
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Cancel the running session, if any. Its poll timer stops and no
    /// further chunks are dispatched; transfers already sent run on unobserved.
    pub fn cancel_active(&self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = active.take() {
            token.cancel();
        }
    }

    /// Analyse the file at `path` from start to finish
    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> Result<SessionOutcome> {
        let path = path.as_ref();
        let filename = Filename::from_path(path)?;
        let file_size = tokio::fs::metadata(path).await?.len();
        let plan = ChunkPlan::new(filename, file_size, self.config.chunk_size)?;

        self.run(path, plan).await
    }

    /// Run a session for an already planned upload of `path`
    pub async fn run(&self, path: &Path, plan: ChunkPlan) -> Result<SessionOutcome> {
        let guard = self.begin_session();
        let outcome = self.drive(path, plan, &guard.token).await;

        if let Err(ClientError::Cancelled) = &outcome {
            info!("Session cancelled");
        }
        outcome
    }

    fn begin_session(&self) -> SessionGuard<'_> {
        let token = CancellationToken::new();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.replace(token.clone()) {
            info!("Cancelling previous session");
            previous.cancel();
        }

        SessionGuard {
            active: &self.active,
            token,
        }
    }

    /// Publish unless this session has been superseded
    fn publish(&self, cancel: &CancellationToken, status: SessionStatus) {
        if !cancel.is_cancelled() {
            self.status.send_replace(status);
        }
    }

    async fn drive(
        &self,
        path: &Path,
        plan: ChunkPlan,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        info!(
            "Starting upload {} of {} ({} bytes in {} chunks)",
            plan.upload_id(),
            plan.filename(),
            plan.file_size(),
            plan.total_chunks()
        );

        let total = plan.total_chunks();
        let mut session = UploadSession::new(plan);
        self.publish(cancel, SessionStatus::Uploading { completed: 0, total });

        let dispatcher = ChunkDispatcher::new(self.backend.clone(), self.config.max_concurrent_chunks);
        let ticket = match dispatcher
            .dispatch(path, &mut session, cancel, |completed, total| {
                self.publish(cancel, SessionStatus::Uploading { completed, total })
            })
            .await
        {
            Ok(ticket) => ticket,
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(e) => {
                warn!("Upload failed: {}", e);
                self.publish(
                    cancel,
                    SessionStatus::Failed {
                        message: UPLOAD_FAILED_MESSAGE.to_string(),
                        result: None,
                    },
                );
                return Err(e);
            }
        };

        let filename = ticket.filename().as_str().to_string();
        self.publish(cancel, SessionStatus::Merging);

        let job_id = match MergeTrigger::new(self.backend.clone()).fire(ticket).await {
            Ok(job_id) => job_id,
            Err(e) => {
                self.publish(
                    cancel,
                    SessionStatus::Failed {
                        message: MERGE_FAILED_MESSAGE.to_string(),
                        result: None,
                    },
                );
                return Err(e);
            }
        };

        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        self.publish(
            cancel,
            SessionStatus::Processing {
                job_id,
                status: JobStatus::Queued,
            },
        );

        let poller = JobPoller::new(
            self.backend.clone(),
            self.config.poll_interval,
            self.config.poll_error_policy,
            self.config.poll_budget(),
        );
        let polled = poller
            .poll(job_id, cancel, |status| {
                if !status.is_terminal() {
                    self.publish(cancel, SessionStatus::Processing { job_id, status });
                }
            })
            .await;

        match polled {
            PollOutcome::Completed => {
                let outcome = match ResultFetcher::new(self.backend.clone())
                    .fetch(job_id, &filename)
                    .await
                {
                    Ok(result) => SessionOutcome::Completed(result),
                    Err(failure) => SessionOutcome::Failed(failure),
                };
                Ok(self.finish(cancel, outcome))
            }
            PollOutcome::Failed(reason) => {
                let failure = AnalysisResult::failure(job_id, &filename, reason);
                Ok(self.finish(cancel, SessionOutcome::Failed(failure)))
            }
            PollOutcome::Aborted => {
                self.publish(cancel, SessionStatus::Aborted { job_id });
                Err(ClientError::PollingAborted { job_id })
            }
            PollOutcome::Cancelled => Err(ClientError::Cancelled),
        }
    }

    fn finish(&self, cancel: &CancellationToken, outcome: SessionOutcome) -> SessionOutcome {
        let status = match &outcome {
            SessionOutcome::Completed(result) => SessionStatus::Completed(result.clone()),
            SessionOutcome::Failed(result) => SessionStatus::Failed {
                message: result.error.clone().unwrap_or_default(),
                result: Some(result.clone()),
            },
        };
        self.publish(cancel, status);
        outcome
    }
}

/// Clears the active-session slot when a session ends, unless a newer session
/// has taken it over
struct SessionGuard<'a> {
    active: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // a superseding session cancels our token while holding this lock
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !self.token.is_cancelled() {
            *active = None;
        }
    }
}
