//! Client for chunked uploads to a NIDS analysis service and tracking of
//! the resulting analysis job

pub mod backend;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod multipart;
pub mod orchestrator;
pub mod poller;

pub use backend::{AnalysisBackend, ChunkUpload};
pub use client::HttpBackend;
pub use config::{Endpoints, HttpBackendConfig, TransferConfig};
pub use dispatcher::ChunkDispatcher;
pub use error::ClientError;
pub use fetcher::ResultFetcher;
pub use merge::MergeTrigger;
pub use multipart::MultipartForm;
pub use orchestrator::{Orchestrator, SessionOutcome};
pub use poller::{JobPoller, PollOutcome};

pub type Result<T> = std::result::Result<T, ClientError>;
