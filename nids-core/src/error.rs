//! Error types for the NIDS upload core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NidsError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("File is empty: {filename}")]
    EmptyFile { filename: String },

    #[error("Chunk index {index} out of range (total {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Invalid analysis result: {0}")]
    InvalidResult(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
