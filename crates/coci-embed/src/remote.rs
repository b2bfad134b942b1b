//! Remote encoder: any OpenAI-compatible `/v1/embeddings` endpoint.

use async_trait::async_trait;
use coci_common::config::EmbeddingSettings;
use coci_common::sandbox::SandboxClient;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use crate::pooling::normalize_in_place;
use crate::{EmbedError, Result, SentenceEmbedder};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct RemoteEmbedder {
    client: SandboxClient,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    batch_size: usize,
}

impl RemoteEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<SecretString>) -> Result<Self> {
        let mut client = SandboxClient::new()?;
        client.allow_base_url(base_url)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            batch_size: 32,
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let base_url = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut embedder = Self::new(base_url, &settings.model, settings.api_key())?;
        embedder.batch_size = settings.batch_size.max(1);
        Ok(embedder)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": &self.model,
            "input": texts,
        });

        let mut req = self.client.post(&url)?.json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Remote(format!("HTTP {status}: {text}")));
        }
        let json: serde_json::Value = resp.json().await?;
        let vectors = parse_embeddings_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Remote(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl SentenceEmbedder for RemoteEmbedder {
    #[instrument(skip(self, texts), fields(n = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(chunk).await?);
        }
        debug!(n = out.len(), "Remote embeddings received");
        Ok(out)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract `data[].embedding` in `index` order and L2-normalise each vector.
fn parse_embeddings_response(resp: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = resp["data"]
        .as_array()
        .ok_or_else(|| EmbedError::Remote("response has no data array".to_string()))?;

    let mut rows: Vec<(u64, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().unwrap_or(position as u64);
        let mut vector: Vec<f32> = item["embedding"]
            .as_array()
            .ok_or_else(|| EmbedError::Remote(format!("item {position} has no embedding")))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        normalize_in_place(&mut vector);
        rows.push((index, vector));
    }
    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}
