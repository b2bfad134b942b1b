use coci_directory::DirectoryError;
use coci_embed::EmbedError;
use thiserror::Error;

use crate::snapshot::SnapshotError;

pub type Result<T> = std::result::Result<T, LinkingError>;

#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(#[from] DirectoryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}
