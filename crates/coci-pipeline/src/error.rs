use coci_common::CociError;
use coci_directory::DirectoryError;
use coci_embed::EmbedError;
use coci_linking::{LinkingError, SnapshotError};
use coci_llm::LlmError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The generation step produced no usable record.
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(#[source] DirectoryError),

    #[error("Snapshot load failed: {0}")]
    SnapshotLoadFailure(#[source] SnapshotError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record invariant violated: {0}")]
    Invariant(String),

    #[error("Persisted record is not valid: {0}")]
    InvalidRecord(#[source] serde_json::Error),

    #[error("Result cache I/O error: {0}")]
    Cache(#[from] std::io::Error),
}

impl From<LinkingError> for PipelineError {
    fn from(e: LinkingError) -> Self {
        match e {
            LinkingError::DirectoryUnavailable(e) => PipelineError::DirectoryUnavailable(e),
            LinkingError::Snapshot(e)             => PipelineError::SnapshotLoadFailure(e),
            LinkingError::Embedding(e)            => PipelineError::Embedding(e),
        }
    }
}

impl From<LlmError> for PipelineError {
    fn from(e: LlmError) -> Self {
        PipelineError::ExtractionFailure(e.to_string())
    }
}

impl From<CociError> for PipelineError {
    fn from(e: CociError) -> Self {
        match e {
            CociError::Invariant(msg) => PipelineError::Invariant(msg),
            other => PipelineError::Config(other.to_string()),
        }
    }
}
