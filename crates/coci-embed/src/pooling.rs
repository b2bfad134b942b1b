//! Token-to-sentence pooling and normalisation.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// How token embeddings collapse into one sentence vector.
///
/// sentence-transformers checkpoints are trained with mean pooling; `Cls`
/// exists for plain BERT checkpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    #[default]
    Mean,
    Cls,
}

impl PoolingStrategy {
    /// `hidden`: (batch, seq_len, dim), `mask`: (batch, seq_len) as f32.
    /// Returns (batch, dim).
    pub fn apply(&self, hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            PoolingStrategy::Mean => masked_mean(hidden, mask),
            PoolingStrategy::Cls => hidden.narrow(1, 0, 1)?.squeeze(1),
        }
    }
}

/// Average of the non-padding token vectors.
fn masked_mean(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
    let weights = mask.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&weights)?.sum(1)?;
    let counts = weights.sum(1)?.clamp(1e-9f32, f32::MAX)?;
    summed.broadcast_div(&counts)
}

/// Row-wise L2 normalisation of a (batch, dim) tensor.
pub fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-9f32, f32::MAX)?;
    embeddings.broadcast_div(&norms)
}

/// In-place L2 normalisation of a single vector. Zero vectors are left as is.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
