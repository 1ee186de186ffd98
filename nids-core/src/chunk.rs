//! Splitting a file into fixed-size chunk descriptors

use crate::{Filename, NidsError, Result, UploadId};
use std::ops::Range;

/// Default chunk size: 100 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// One contiguous byte range of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    /// 0-based position in the upload
    pub index: u32,
    /// Byte offset in the source file
    pub offset: u64,
    /// Length in bytes; only the final chunk may be shorter than the chunk size
    pub len: u64,
}

impl ChunkDescriptor {
    /// Byte range `[offset, offset + len)`
    pub fn byte_range(&self) -> Range<u64> {
        self.offset..self.offset + self.len
    }
}

/// Number of chunks needed for `file_size` bytes: `ceil(file_size / chunk_size)`
pub fn chunk_count(file_size: u64, chunk_size: u64) -> Result<u32> {
    if chunk_size == 0 {
        return Err(NidsError::InvalidChunkSize("chunk size must be positive".to_string()));
    }

    let count = file_size.div_ceil(chunk_size);
    u32::try_from(count).map_err(|_| {
        NidsError::InvalidChunkSize(format!(
            "{} bytes at chunk size {} needs {} chunks",
            file_size, chunk_size, count
        ))
    })
}

/// Partition `[0, file_size)` into ordered descriptors with no gaps or overlaps
pub fn split(file_size: u64, chunk_size: u64) -> Result<Vec<ChunkDescriptor>> {
    let total = chunk_count(file_size, chunk_size)?;

    Ok((0..total)
        .map(|index| {
            let offset = u64::from(index) * chunk_size;
            ChunkDescriptor {
                index,
                offset,
                len: chunk_size.min(file_size - offset),
            }
        })
        .collect())
}

/// Everything fixed at session start: identity, file, and chunk layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    upload_id: UploadId,
    filename: Filename,
    file_size: u64,
    chunk_size: u64,
    chunks: Vec<ChunkDescriptor>,
}

impl ChunkPlan {
    /// Plan a new upload with a freshly generated upload id
    pub fn new(filename: Filename, file_size: u64, chunk_size: u64) -> Result<Self> {
        Self::with_upload_id(UploadId::generate(), filename, file_size, chunk_size)
    }

    /// Plan an upload under a caller-supplied id
    pub fn with_upload_id(
        upload_id: UploadId,
        filename: Filename,
        file_size: u64,
        chunk_size: u64,
    ) -> Result<Self> {
        if file_size == 0 {
            return Err(NidsError::EmptyFile {
                filename: filename.as_str().to_string(),
            });
        }

        let chunks = split(file_size, chunk_size)?;

        Ok(ChunkPlan {
            upload_id,
            filename,
            file_size,
            chunk_size,
            chunks,
        })
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    pub fn filename(&self) -> &Filename {
        &self.filename
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Computed once at plan time
    pub fn total_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// Look up a descriptor by index
    pub fn chunk(&self, index: u32) -> Result<&ChunkDescriptor> {
        self.chunks.get(index as usize).ok_or(NidsError::ChunkOutOfRange {
            index,
            total: self.total_chunks(),
        })
    }

    /// Form fields accompanying the bytes of chunk `index`
    pub fn transfer_fields(&self, index: u32) -> Result<ChunkTransferFields> {
        let descriptor = self.chunk(index)?;
        Ok(ChunkTransferFields {
            filename: self.filename.clone(),
            chunk_index: descriptor.index,
            total_chunks: self.total_chunks(),
            upload_id: self.upload_id.clone(),
        })
    }
}

/// Metadata sent with every chunk transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTransferFields {
    pub filename: Filename,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub upload_id: UploadId,
}

impl ChunkTransferFields {
    /// Name of the binary part carrying the chunk bytes
    pub const CHUNK_FIELD: &'static str = "chunk";

    /// Text fields in wire order, after the binary `chunk` part
    pub fn text_fields(&self) -> [(&'static str, String); 4] {
        [
            ("filename", self.filename.as_str().to_string()),
            ("chunkIndex", self.chunk_index.to_string()),
            ("totalChunks", self.total_chunks.to_string()),
            ("uploadId", self.upload_id.as_str().to_string()),
        ]
    }
}
