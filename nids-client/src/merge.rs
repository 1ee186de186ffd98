//! Reassembly trigger

use crate::backend::AnalysisBackend;
use crate::{ClientError, Result};
use nids_core::{JobId, MergeRequest, MergeTicket};
use std::sync::Arc;
use tracing::{info, warn};

pub struct MergeTrigger {
    backend: Arc<dyn AnalysisBackend>,
}

impl MergeTrigger {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        MergeTrigger { backend }
    }

    /// Request reassembly of a fully delivered upload. Consumes the session's
    /// only ticket, so a session cannot merge twice.
    pub async fn fire(&self, ticket: MergeTicket) -> Result<JobId> {
        let (filename, upload_id) = ticket.into_parts();
        info!("Requesting merge of upload {} ({})", upload_id, filename);

        let request = MergeRequest { filename, upload_id };
        match self.backend.merge(&request).await {
            Ok(response) => {
                info!(
                    "Merge accepted, job {} started{}",
                    response.job_id,
                    response
                        .message
                        .as_deref()
                        .map(|m| format!(": {}", m))
                        .unwrap_or_default()
                );
                Ok(response.job_id)
            }
            Err(e) => {
                warn!("Merge of upload {} failed: {}", request.upload_id, e);
                Err(ClientError::Merge(e.to_string()))
            }
        }
    }
}
