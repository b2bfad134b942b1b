use thiserror::Error;

pub type Result<T> = std::result::Result<T, DirectoryError>;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected directory response: {0}")]
    Decode(String),

    #[error(transparent)]
    Sandbox(#[from] coci_common::CociError),
}
