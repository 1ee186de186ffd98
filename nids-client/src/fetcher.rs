//! Final result retrieval

use crate::backend::AnalysisBackend;
use crate::{ClientError, Result};
use nids_core::{AnalysisResult, JobId, FETCH_FAILED_MESSAGE};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ResultFetcher {
    backend: Arc<dyn AnalysisBackend>,
}

impl ResultFetcher {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        ResultFetcher { backend }
    }

    /// Fetch the result of a completed job. `Err` carries a locally built
    /// failure result for an unreachable or malformed answer.
    pub async fn fetch(
        &self,
        job_id: JobId,
        filename: &str,
    ) -> std::result::Result<AnalysisResult, AnalysisResult> {
        match self.try_fetch(job_id).await {
            Ok(result) => {
                info!(
                    "Fetched result for job {}: {} threats, risk score {}",
                    job_id, result.summary.total_threats, result.summary.risk_score
                );
                Ok(result)
            }
            Err(e) => {
                warn!("Result fetch for job {} failed: {}", job_id, e);
                Err(AnalysisResult::failure(job_id, filename, FETCH_FAILED_MESSAGE))
            }
        }
    }

    async fn try_fetch(&self, job_id: JobId) -> Result<AnalysisResult> {
        let result = self.backend.job_result(job_id).await?;

        if result.job_id != job_id {
            return Err(ClientError::Protocol(format!(
                "asked for result of job {} but got job {}",
                job_id, result.job_id
            )));
        }
        result
            .validate()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        Ok(result)
    }
}
