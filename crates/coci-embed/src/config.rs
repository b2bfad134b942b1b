//! Configuration for the local sentence encoder.

use coci_common::config::EmbeddingSettings;
use serde::{Deserialize, Serialize};

use crate::PoolingStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Hugging Face model ID
    pub model_id: String,

    /// Tokens kept per input; longer inputs are truncated.
    pub max_length: usize,

    pub batch_size: usize,

    pub normalize: bool,

    pub pooling: PoolingStrategy,

    pub use_gpu: bool,

    /// Maximum number of cached embeddings (0 disables the cache).
    pub cache_size: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            // sentence-transformers truncates MiniLM inputs at 256 word pieces
            max_length: 256,
            batch_size: 32,
            normalize: true,
            pooling: PoolingStrategy::Mean,
            use_gpu: false,
            cache_size: 4_096,
        }
    }
}

impl From<&EmbeddingSettings> for EncoderConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            model_id: settings.model.clone(),
            batch_size: settings.batch_size.max(1),
            use_gpu: settings.use_gpu,
            ..Default::default()
        }
    }
}

impl EncoderConfig {
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }
}
