//! Client error types

use nids_core::{JobId, QueryFailure};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Server returned {status}: {message}")]
    Application { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Protocol(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Merge failed: {0}")]
    Merge(String),

    #[error("Polling for job {job_id} stopped without a final status")]
    PollingAborted { job_id: JobId },

    #[error("Session cancelled")]
    Cancelled,

    #[error("Core error: {0}")]
    Core(#[from] nids_core::NidsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Request never completed: network failure or timeout
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout(_))
    }

    /// Classify for the poll state machine
    pub fn to_query_failure(&self) -> QueryFailure {
        match self {
            ClientError::Transport(_) | ClientError::Timeout(_) => {
                QueryFailure::Transport(self.to_string())
            }
            ClientError::Protocol(_) | ClientError::Core(_) => QueryFailure::Protocol(self.to_string()),
            _ => QueryFailure::Application(self.to_string()),
        }
    }
}
