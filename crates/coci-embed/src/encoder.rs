//! Local BERT sentence encoder using Candle.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, HiddenAct, PositionEmbeddingType};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use lru::LruCache;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument};

use crate::pooling::l2_normalize;
use crate::{EmbedError, EncoderConfig, Result, SentenceEmbedder};

/// BERT-family sentence encoder loaded from the Hugging Face Hub.
///
/// Must be the same checkpoint the authority snapshots were built with,
/// otherwise distances are meaningless.
pub struct BertSentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    config: EncoderConfig,
    dimension: usize,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl BertSentenceEncoder {
    pub async fn new(config: EncoderConfig) -> Result<Self> {
        let start = Instant::now();
        info!(model = %config.model_id, "Loading sentence encoder");

        let device = Self::select_device(&config);
        debug!(?device, "Encoder device selected");

        // hf-hub's sync API blocks on file downloads
        let model_id = config.model_id.clone();
        let (bert_config, tokenizer, weights_path) = tokio::task::spawn_blocking(move || {
            let api = Api::new()?;
            let repo = api.repo(Repo::new(model_id, RepoType::Model));

            let config_path = repo.get("config.json")?;
            let bert_config = Self::load_config(&config_path)?;

            let tokenizer_path = repo.get("tokenizer.json")?;
            let tokenizer = Tokenizer::from_file(&tokenizer_path)?;

            let weights_path = repo
                .get("model.safetensors")
                .or_else(|_| repo.get("pytorch_model.bin"))?;

            Ok::<_, EmbedError>((bert_config, tokenizer, weights_path))
        })
        .await
        .map_err(|e| EmbedError::ModelLoad(e.to_string()))??;

        let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            // SAFETY: the file is a hub cache entry that is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)? }
        } else {
            VarBuilder::from_pth(&weights_path, DType::F32, &device)?
        };

        let model = BertModel::load(vb, &bert_config)?;
        let dimension = bert_config.hidden_size;
        info!(
            model = %config.model_id,
            dimension,
            elapsed_s = start.elapsed().as_secs_f32(),
            "Sentence encoder loaded"
        );

        let cache = NonZeroUsize::new(config.cache_size).map(|n| Mutex::new(LruCache::new(n)));

        Ok(Self { model, tokenizer, device, config, dimension, cache })
    }

    fn select_device(config: &EncoderConfig) -> Device {
        if !config.use_gpu {
            return Device::Cpu;
        }

        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => return device,
                Err(e) => debug!("CUDA not available: {e}, falling back to CPU"),
            }
        }

        #[cfg(feature = "metal")]
        {
            match Device::new_metal(0) {
                Ok(device) => return device,
                Err(e) => debug!("Metal not available: {e}, falling back to CPU"),
            }
        }

        Device::Cpu
    }

    /// Build the Candle BERT config from a hub `config.json`.
    /// Missing keys take the MiniLM-L6 values.
    fn load_config(path: &Path) -> Result<Config> {
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let usize_of = |key: &str, default: usize| {
            json.get(key).and_then(|v| v.as_u64()).map_or(default, |v| v as usize)
        };
        let f64_of = |key: &str, default: f64| json.get(key).and_then(|v| v.as_f64()).unwrap_or(default);

        let hidden_act = match json.get("hidden_act").and_then(|v| v.as_str()) {
            Some("relu") => HiddenAct::Relu,
            Some("gelu_new") | Some("gelu_approximate") => HiddenAct::GeluApproximate,
            _ => HiddenAct::Gelu,
        };

        Ok(Config {
            vocab_size: usize_of("vocab_size", 30522),
            hidden_size: usize_of("hidden_size", 384),
            num_hidden_layers: usize_of("num_hidden_layers", 6),
            num_attention_heads: usize_of("num_attention_heads", 12),
            intermediate_size: usize_of("intermediate_size", 1536),
            hidden_act,
            hidden_dropout_prob: f64_of("hidden_dropout_prob", 0.1),
            max_position_embeddings: usize_of("max_position_embeddings", 512),
            type_vocab_size: usize_of("type_vocab_size", 2),
            initializer_range: f64_of("initializer_range", 0.02),
            layer_norm_eps: f64_of("layer_norm_eps", 1e-12),
            pad_token_id: usize_of("pad_token_id", 0),
            position_embedding_type: PositionEmbeddingType::Absolute,
            use_cache: true,
            classifier_dropout: None,
            model_type: None,
        })
    }

    /// Encode one batch: tokenize, pad to the longest input, run BERT, pool.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self.tokenizer.encode_batch(texts.to_vec(), true)?;

        let max_len = self.config.max_length.min(512);
        let rows: Vec<(Vec<u32>, Vec<u32>, Vec<u32>)> = encodings
            .iter()
            .map(|enc| {
                let len = enc.get_ids().len().min(max_len);
                (
                    enc.get_ids()[..len].to_vec(),
                    enc.get_attention_mask()[..len].to_vec(),
                    enc.get_type_ids()[..len].to_vec(),
                )
            })
            .collect();

        let seq_len = rows.iter().map(|(ids, _, _)| ids.len()).max().unwrap_or(0);
        if seq_len == 0 {
            return Err(EmbedError::InvalidInput("tokenizer produced no tokens".to_string()));
        }

        let batch = rows.len();
        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        let mut type_ids = Vec::with_capacity(batch * seq_len);
        for (row_ids, row_mask, row_types) in &rows {
            let pad = seq_len - row_ids.len();
            ids.extend(row_ids.iter().copied().chain(std::iter::repeat_n(0, pad)));
            mask.extend(row_mask.iter().copied().chain(std::iter::repeat_n(0, pad)));
            type_ids.extend(row_types.iter().copied().chain(std::iter::repeat_n(0, pad)));
        }

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(type_ids, (batch, seq_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?
            .to_dtype(DType::F32)?;

        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = self.config.pooling.apply(&hidden, &attention_mask)?;
        let pooled = if self.config.normalize { l2_normalize(&pooled)? } else { pooled };

        Ok(pooled.to_vec2::<f32>()?)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.device, Device::Cuda(_) | Device::Metal(_))
    }

    fn cache_get(&self, text: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        let mut guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(text).cloned()
    }

    fn cache_put(&self, text: &str, embedding: &[f32]) {
        if let Some(cache) = &self.cache {
            let mut guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.put(text.to_string(), embedding.to_vec());
        }
    }
}

#[async_trait]
impl SentenceEmbedder for BertSentenceEncoder {
    #[instrument(skip(self, texts), fields(n = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let mut out: Vec<Option<Vec<f32>>> = texts.iter().map(|t| self.cache_get(t)).collect();
        let pending: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();

        for chunk in pending.chunks(self.config.batch_size.max(1)) {
            let batch: Vec<String> = chunk.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.embed_batch(&batch)?;
            for (&i, vector) in chunk.iter().zip(vectors) {
                self.cache_put(&texts[i], &vector);
                out[i] = Some(vector);
            }
        }

        debug!(
            n = texts.len(),
            computed = pending.len(),
            elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
            "Embedded texts"
        );

        out.into_iter()
            .map(|v| v.ok_or_else(|| EmbedError::Inference("batch returned too few rows".to_string())))
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.config.model_id
    }

    async fn output_dimension(&self) -> Result<usize> {
        Ok(self.dimension)
    }
}
