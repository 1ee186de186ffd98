//! Chunk transfer dispatch
//!
//! Chunks are read from disk and sent by a bounded pool of workers. The
//! dispatch loop is the only place completions are applied to the
//! [`UploadSession`], so the session stays a single-writer state machine even
//! though transfers finish in any order.

use crate::backend::{AnalysisBackend, ChunkUpload};
use crate::{ClientError, Result};
use bytes::Bytes;
use nids_core::{ChunkDescriptor, Delivery, MergeTicket, UploadSession};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ChunkDispatcher {
    backend: Arc<dyn AnalysisBackend>,
    max_in_flight: usize,
}

impl ChunkDispatcher {
    pub fn new(backend: Arc<dyn AnalysisBackend>, max_in_flight: usize) -> Self {
        ChunkDispatcher {
            backend,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Transfer every chunk of `session` from `source`.
    ///
    /// Returns the session's merge ticket once the last chunk is confirmed.
    /// The first failed chunk fails the session: nothing more is dispatched,
    /// and transfers already in flight are left to finish unobserved.
    pub async fn dispatch<F>(
        &self,
        source: &Path,
        session: &mut UploadSession,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<MergeTicket>
    where
        F: FnMut(u32, u32),
    {
        let source = Arc::new(source.to_path_buf());
        let total = session.total_chunks();
        let mut pending = session.plan().chunks().to_vec().into_iter();
        let mut workers: JoinSet<(u32, Result<()>)> = JoinSet::new();

        loop {
            while session.accepts_dispatch() && workers.len() < self.max_in_flight {
                let Some(chunk) = pending.next() else { break };
                let fields = session.plan().transfer_fields(chunk.index)?;
                let backend = self.backend.clone();
                let source = source.clone();

                debug!("Dispatching chunk {}/{} ({} bytes)", chunk.index + 1, total, chunk.len);
                workers.spawn(async move {
                    let outcome = match read_chunk(&source, &chunk).await {
                        Ok(data) => backend.upload_chunk(ChunkUpload { fields, data }).await,
                        Err(e) => Err(e),
                    };
                    (chunk.index, outcome)
                });
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    session.record_failure("session cancelled");
                    workers.detach_all();
                    return Err(ClientError::Cancelled);
                }
                joined = workers.join_next() => joined,
            };

            let Some(joined) = joined else {
                return Err(ClientError::Upload(format!(
                    "no chunk transfers left but only {}/{} delivered",
                    session.completed_count(),
                    total
                )));
            };

            let (index, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    session.record_failure(format!("chunk worker crashed: {}", e));
                    workers.detach_all();
                    return Err(ClientError::Upload(format!("chunk worker crashed: {}", e)));
                }
            };

            if let Err(e) = outcome {
                warn!("Chunk {}/{} failed: {}", index + 1, total, e);
                session.record_failure(format!("chunk {} failed: {}", index, e));
                workers.detach_all();
                return Err(ClientError::Upload(format!(
                    "chunk {} of {} failed: {}",
                    index, total, e
                )));
            }

            match session.record_delivered(index)? {
                Delivery::Progress { completed, total } => {
                    debug!("Chunk {} delivered ({}/{})", index, completed, total);
                    on_progress(completed, total);
                }
                Delivery::Complete(ticket) => {
                    info!("All {} chunks delivered for upload {}", total, ticket.upload_id());
                    on_progress(total, total);
                    return Ok(ticket);
                }
                Delivery::Ignored => debug!("Ignoring repeated completion of chunk {}", index),
            }
        }
    }
}

/// Read one chunk's byte range from the source file
async fn read_chunk(path: &Path, chunk: &ChunkDescriptor) -> Result<Bytes> {
    let len = usize::try_from(chunk.len)
        .map_err(|_| ClientError::Upload(format!("chunk {} too large for memory", chunk.index)))?;

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(chunk.offset)).await?;

    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
