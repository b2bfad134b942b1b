//! COCI embedding service
//!
//! Turns short strings (conference series names, topic phrases) into the
//! vectors the authority snapshots were indexed with. Two encoders sit behind
//! the [`SentenceEmbedder`] trait:
//!
//! - [`BertSentenceEncoder`]: in-process BERT via Candle, weights pulled from
//!   the Hugging Face Hub (`sentence-transformers/all-MiniLM-L6-v2` by default)
//! - [`RemoteEmbedder`]: any OpenAI-compatible `/v1/embeddings` endpoint
//!
//! Both return L2-normalised vectors, so squared L2 distance between a query
//! and a snapshot sentence is `2 − 2·cos`.
//!
//! # Example
//! ```rust,ignore
//! use coci_embed::{from_settings, SentenceEmbedder};
//!
//! let embedder = from_settings(&config.embedding).await?;
//! let vecs = embedder.embed(&["Semantic Web".to_string()]).await?;
//! println!("dimension: {}", vecs[0].len()); // 384
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod pooling;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use coci_common::config::{EmbeddingBackend, EmbeddingSettings};

pub use config::EncoderConfig;
pub use encoder::BertSentenceEncoder;
pub use error::{EmbedError, Result};
pub use pooling::PoolingStrategy;
pub use remote::RemoteEmbedder;

/// A text-embedding function.
///
/// Output order matches input order; one vector per input string.
#[async_trait]
pub trait SentenceEmbedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidInput("no embedding produced".to_string()))
    }

    /// Length of the vectors this embedder produces. Encodes a short sample text
    /// unless the implementation knows it up front.
    async fn output_dimension(&self) -> Result<usize> {
        Ok(self.embed_one("conference").await?.len())
    }
}

/// Build the encoder selected in the configuration.
pub async fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn SentenceEmbedder>> {
    match settings.backend {
        EmbeddingBackend::Local => {
            let encoder = BertSentenceEncoder::new(EncoderConfig::from(settings)).await?;
            Ok(Arc::new(encoder))
        }
        EmbeddingBackend::OpenAiCompatible => Ok(Arc::new(RemoteEmbedder::from_settings(settings)?)),
    }
}
