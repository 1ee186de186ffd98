//! Job status polling driver
//!
//! Owns the one timer of a session and feeds each query outcome into
//! [`JobPollMachine`]. The timer lives inside the polling loop, so it is
//! dropped on every terminal, aborted, or cancelled exit.

use crate::backend::AnalysisBackend;
use crate::ClientError;
use nids_core::{JobId, JobPollMachine, JobStatus, PollAction, PollErrorPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How polling ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Job reported `completed`
    Completed,
    /// Job reported `failed`, or could not be tracked under the retry policy
    Failed(String),
    /// Stopped on a query error with the outcome unknown
    Aborted,
    /// The session was replaced or cancelled
    Cancelled,
}

pub struct JobPoller {
    backend: Arc<dyn AnalysisBackend>,
    interval: Duration,
    policy: PollErrorPolicy,
    budget: Option<u32>,
}

impl JobPoller {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        interval: Duration,
        policy: PollErrorPolicy,
        budget: Option<u32>,
    ) -> Self {
        JobPoller {
            backend,
            interval,
            policy,
            budget,
        }
    }

    /// Poll `job_id` every interval until it reaches a terminal state.
    /// `on_status` sees every status read, terminal ones included.
    pub async fn poll<F>(
        &self,
        job_id: JobId,
        cancel: &CancellationToken,
        mut on_status: F,
    ) -> PollOutcome
    where
        F: FnMut(JobStatus),
    {
        let mut machine = JobPollMachine::new(job_id, self.policy, self.budget);
        machine.start();
        let mut delay = self.interval;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    machine.cancel();
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let queried = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    machine.cancel();
                    return PollOutcome::Cancelled;
                }
                queried = self.backend.job_status(job_id) => queried,
            };

            let status = queried.and_then(|response| {
                check_job_id(job_id, response.job_id)?;
                Ok(response.status)
            });

            let action = match status {
                Ok(status) => {
                    debug!("Job {} status: {} (poll {})", job_id, status, machine.polls() + 1);
                    on_status(status);
                    machine.observe(status)
                }
                Err(e) => {
                    warn!("Status check for job {} failed: {}", job_id, e);
                    machine.query_failed(&e.to_query_failure())
                }
            };

            match action {
                PollAction::Continue => delay = self.interval,
                PollAction::RetryAfter(backoff) => {
                    info!("Retrying status check for job {} in {:?}", job_id, backoff);
                    delay = backoff;
                }
                PollAction::FetchResult => {
                    info!("Job {} completed after {} polls", job_id, machine.polls());
                    return PollOutcome::Completed;
                }
                PollAction::ReportFailure(reason) => {
                    info!("Job {} failed: {}", job_id, reason);
                    return PollOutcome::Failed(reason);
                }
                PollAction::Stop => {
                    warn!("Stopped polling job {}; final status unknown", job_id);
                    return PollOutcome::Aborted;
                }
            }
        }
    }
}

fn check_job_id(expected: JobId, reported: Option<JobId>) -> Result<(), ClientError> {
    match reported {
        Some(reported) if reported != expected => Err(ClientError::Protocol(format!(
            "asked for job {} but got status of job {}",
            expected, reported
        ))),
        _ => Ok(()),
    }
}
