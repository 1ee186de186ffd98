//! The analysis service as seen by the orchestrator

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use nids_core::{AnalysisResult, ChunkTransferFields, JobId, MergeRequest, MergeResponse, StatusResponse};

/// One chunk on its way to the storage endpoint
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub fields: ChunkTransferFields,
    pub data: Bytes,
}

/// Remote operations a session needs. Implementations must be safe to call
/// from several chunk workers at once.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Store one chunk; any non-2xx answer is an error
    async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<()>;

    /// Request server-side reassembly and start the analysis job
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResponse>;

    async fn job_status(&self, job_id: JobId) -> Result<StatusResponse>;

    async fn job_result(&self, job_id: JobId) -> Result<AnalysisResult>;
}
