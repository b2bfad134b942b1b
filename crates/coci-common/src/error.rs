use thiserror::Error;

#[derive(Debug, Error)]
pub enum CociError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Record invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, CociError>;
