//! Job status polling state machine
//!
//! Runtime-free: the caller owns the timer, performs the status query and
//! feeds the outcome back in; the machine answers with the next action.

use crate::{JobId, JobStatus};
use std::time::Duration;

/// Default delay between status queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a status query that could not complete is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollErrorPolicy {
    /// Stop polling and record no terminal status
    Abort,
    /// Retry transport failures with exponential backoff; after `max_retries`
    /// consecutive failures the job is reported failed
    Retry {
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
}

impl Default for PollErrorPolicy {
    fn default() -> Self {
        PollErrorPolicy::Retry {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Why a status query failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// Request did not complete (network, timeout)
    Transport(String),
    /// Server answered with an error status
    Application(String),
    /// Server answered with something unreadable
    Protocol(String),
}

impl QueryFailure {
    pub fn message(&self) -> &str {
        match self {
            QueryFailure::Transport(m) | QueryFailure::Application(m) | QueryFailure::Protocol(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Completed,
    Failed { reason: String },
    /// Stopped with the job's outcome unknown
    Aborted,
}

impl PollState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            PollState::Completed | PollState::Failed { .. } | PollState::Aborted
        )
    }
}

/// What the driver does next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// Wait one poll interval, then query again
    Continue,
    /// Wait this long, then query again
    RetryAfter(Duration),
    /// Job completed: fetch its result
    FetchResult,
    /// Job failed or cannot be tracked: produce a failure result locally
    ReportFailure(String),
    /// Stop without recording an outcome
    Stop,
}

/// Upper bound on status queries for a job expected to finish within
/// `max_job_duration`: `ceil(max_job_duration / poll_interval) + 1`
pub fn poll_budget(max_job_duration: Duration, poll_interval: Duration) -> u32 {
    let interval = poll_interval.as_nanos().max(1);
    let ticks = max_job_duration.as_nanos().div_ceil(interval);
    u32::try_from(ticks).unwrap_or(u32::MAX - 1) + 1
}

#[derive(Debug)]
pub struct JobPollMachine {
    job_id: JobId,
    policy: PollErrorPolicy,
    budget: Option<u32>,
    state: PollState,
    polls: u32,
    consecutive_errors: u32,
    last_status: Option<JobStatus>,
}

impl JobPollMachine {
    pub fn new(job_id: JobId, policy: PollErrorPolicy, budget: Option<u32>) -> Self {
        JobPollMachine {
            job_id,
            policy,
            budget,
            state: PollState::Idle,
            polls: 0,
            consecutive_errors: 0,
            last_status: None,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Number of status queries answered so far, successful or not
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last_status(&self) -> Option<JobStatus> {
        self.last_status
    }

    /// Idle -> Polling; no effect in any other state
    pub fn start(&mut self) {
        if self.state == PollState::Idle {
            self.state = PollState::Polling;
        }
    }

    /// Feed a successfully read job status
    pub fn observe(&mut self, status: JobStatus) -> PollAction {
        if self.state != PollState::Polling {
            return PollAction::Stop;
        }

        self.polls += 1;
        self.consecutive_errors = 0;
        self.last_status = Some(status);

        match status {
            JobStatus::Completed => {
                self.state = PollState::Completed;
                PollAction::FetchResult
            }
            JobStatus::Failed => self.fail(crate::JOB_FAILED_MESSAGE.to_string()),
            JobStatus::Queued | JobStatus::Processing => self.continue_or_expire(PollAction::Continue),
        }
    }

    /// Feed a status query that did not produce a status
    pub fn query_failed(&mut self, failure: &QueryFailure) -> PollAction {
        if self.state != PollState::Polling {
            return PollAction::Stop;
        }

        self.polls += 1;

        match (self.policy, failure) {
            (PollErrorPolicy::Abort, _) => {
                self.state = PollState::Aborted;
                PollAction::Stop
            }
            (
                PollErrorPolicy::Retry {
                    max_retries,
                    base_delay,
                    max_delay,
                },
                QueryFailure::Transport(message),
            ) => {
                self.consecutive_errors += 1;
                if self.consecutive_errors > max_retries {
                    return self.fail(format!(
                        "Status check failed after {} retries: {}",
                        max_retries, message
                    ));
                }

                let shift = (self.consecutive_errors - 1).min(16);
                let delay = base_delay.saturating_mul(1 << shift).min(max_delay);
                self.continue_or_expire(PollAction::RetryAfter(delay))
            }
            (PollErrorPolicy::Retry { .. }, other) => {
                self.fail(format!("Status check failed: {}", other.message()))
            }
        }
    }

    /// Stop from outside (session replaced); the outcome stays unknown
    pub fn cancel(&mut self) {
        if !self.state.is_finished() {
            self.state = PollState::Aborted;
        }
    }

    fn fail(&mut self, reason: String) -> PollAction {
        self.state = PollState::Failed {
            reason: reason.clone(),
        };
        PollAction::ReportFailure(reason)
    }

    fn continue_or_expire(&mut self, next: PollAction) -> PollAction {
        match self.budget {
            Some(budget) if self.polls >= budget => self.fail(format!(
                "Job {} did not finish within {} status checks",
                self.job_id, budget
            )),
            _ => next,
        }
    }
}
