//! Upload session bookkeeping
//!
//! The session is the single writer of chunk completion state. Every
//! completion is fed through [`UploadSession::record_delivered`], which both
//! counts the chunk and decides, in the same call, whether this completion is
//! the one that finishes the upload. Only that call hands out the
//! [`MergeTicket`], so reassembly can be requested at most once no matter how
//! completions interleave.

use crate::{ChunkPlan, Filename, NidsError, Result, UploadId};

/// Proof that every chunk of a session has been delivered.
///
/// Not `Clone`: exactly one exists per session, and firing the merge consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct MergeTicket {
    filename: Filename,
    upload_id: UploadId,
}

impl MergeTicket {
    pub fn filename(&self) -> &Filename {
        &self.filename
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    /// Give up the ticket for the merge request body
    pub fn into_parts(self) -> (Filename, UploadId) {
        (self.filename, self.upload_id)
    }
}

/// What a single chunk completion did to the session
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Counted; more chunks outstanding
    Progress { completed: u32, total: u32 },
    /// Counted, and it was the last one
    Complete(MergeTicket),
    /// Not counted: duplicate index, or the session already failed
    Ignored,
}

/// Phase of the transfer part of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPhase {
    Transferring,
    /// All chunks delivered and the merge ticket issued
    Delivered,
    Failed { reason: String },
}

/// One in-flight transfer
#[derive(Debug)]
pub struct UploadSession {
    plan: ChunkPlan,
    delivered: Vec<bool>,
    completed_count: u32,
    phase: UploadPhase,
}

impl UploadSession {
    pub fn new(plan: ChunkPlan) -> Self {
        let total = plan.total_chunks() as usize;
        UploadSession {
            plan,
            delivered: vec![false; total],
            completed_count: 0,
            phase: UploadPhase::Transferring,
        }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn completed_count(&self) -> u32 {
        self.completed_count
    }

    pub fn total_chunks(&self) -> u32 {
        self.plan.total_chunks()
    }

    pub fn phase(&self) -> &UploadPhase {
        &self.phase
    }

    /// Further chunks may be dispatched only while transferring
    pub fn accepts_dispatch(&self) -> bool {
        self.phase == UploadPhase::Transferring
    }

    /// Record a confirmed chunk and, atomically with the count, decide whether
    /// the merge hand-off happens now.
    pub fn record_delivered(&mut self, index: u32) -> Result<Delivery> {
        let total = self.total_chunks();
        let slot = self
            .delivered
            .get_mut(index as usize)
            .ok_or(NidsError::ChunkOutOfRange { index, total })?;

        if self.phase != UploadPhase::Transferring || *slot {
            return Ok(Delivery::Ignored);
        }

        *slot = true;
        self.completed_count += 1;

        if self.completed_count == total {
            self.phase = UploadPhase::Delivered;
            return Ok(Delivery::Complete(MergeTicket {
                filename: self.plan.filename().clone(),
                upload_id: self.plan.upload_id().clone(),
            }));
        }

        Ok(Delivery::Progress {
            completed: self.completed_count,
            total,
        })
    }

    /// Mark the session failed. Returns false if it had already failed or
    /// finished, in which case nothing changes.
    pub fn record_failure(&mut self, reason: impl Into<String>) -> bool {
        if self.phase != UploadPhase::Transferring {
            return false;
        }
        self.phase = UploadPhase::Failed {
            reason: reason.into(),
        };
        true
    }
}
