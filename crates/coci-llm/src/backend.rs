//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   OpenAiBackend: OpenAI API (gpt-4o, gpt-4o-mini, …)
//!   OpenAiCompatibleBackend: any OpenAI-compatible endpoint (OpenRouter,
//!     vLLM, LM Studio, …), with extra headers
//!   OllamaBackend: local Ollama through its OpenAI-compatible API
//!
//! All outbound calls go through the sandboxed HTTP client.

use std::sync::Arc;

use async_trait::async_trait;
use coci_common::config::LlmConfig;
use coci_common::sandbox::SandboxClient;
use coci_common::CociError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend misconfigured: {0}")]
    Config(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error(transparent)]
    Sandbox(#[from] CociError),
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// A named JSON schema the completion must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

/// OpenAI `response_format`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

impl ResponseFormat {
    pub fn strict_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat { name: name.into(), strict: true, schema },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
}

// ── Helpers: OpenAI wire format ──────────────────────────────────────────────

/// Chat-completions request body; `response_format` only when requested.
fn chat_body(req: &LlmRequest, default_model: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model":       req.model.as_deref().unwrap_or(default_model),
        "messages":    req.messages,
        "max_tokens":  req.max_tokens.unwrap_or(4096),
        "temperature": req.temperature.unwrap_or(0.0),
    });
    if let Some(format) = &req.response_format {
        body["response_format"] = serde_json::to_value(format).unwrap_or(serde_json::Value::Null);
    }
    body
}

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let body: serde_json::Value = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(_) if status >= 400 => {
            return Err(LlmError::ApiError { status, message: text });
        }
        Err(e) => return Err(e.into()),
    };
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(body)
}

// ── 1. Ollama (local) ─────────────────────────────────────────────────────────

pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    client: SandboxClient,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let base_url = base_url.into();
        let mut client = SandboxClient::new()?;
        client.allow_base_url(&base_url)?;
        Ok(Self { base_url, model: model.into(), client })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    #[instrument(skip(self, req), fields(model = %self.model))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = chat_body(&req, &self.model);
        let resp = self.client.post(&url)?.json(&body).send().await
            .map_err(|e| LlmError::Unavailable(format!("Ollama unreachable at {url}: {e}")))?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { true }
}

// ── 2. OpenAI ─────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    pub model: String,
    api_key: SecretString,
    client: SandboxClient,
}

impl OpenAiBackend {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self { model: model.into(), api_key, client: SandboxClient::new()? })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    #[instrument(skip(self, req), fields(model = %self.model))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = chat_body(&req, &self.model);
        let resp = self.client
            .post("https://api.openai.com/v1/chat/completions")?
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

// ── 3. OpenAI-Compatible (OpenRouter, vLLM, LM Studio, …) ───────────────────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<SecretString>,
    headers: Vec<(String, String)>,
    client: SandboxClient,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self, LlmError> {
        let base_url = base_url.into();
        let mut client = SandboxClient::new()?;
        client.allow_base_url(&base_url)?;
        Ok(Self {
            base_url,
            model: model.into(),
            api_key,
            headers: Vec::new(),
            client,
        })
    }

    /// Extra header sent with every request (e.g. OpenRouter's `HTTP-Referer`, `X-Title`).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn decorate(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(k) = &self.api_key {
            req = req.bearer_auth(k.expose_secret());
        }
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    #[instrument(skip(self, req), fields(model = %self.model, base_url = %self.base_url))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = chat_body(&req, &self.model);
        let resp = self.decorate(self.client.post(&url)?).json(&body).send().await?;
        let json = check_response_status(resp).await?;
        let out = parse_openai_response(&json, &self.model);
        debug!(
            prompt_tokens = out.prompt_tokens,
            completion_tokens = out.completion_tokens,
            "Completion received"
        );
        Ok(out)
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

// ── Construction from configuration ──────────────────────────────────────────

/// Build the backend named by `llm.provider`.
pub fn backend_from_config(cfg: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    match cfg.provider.as_str() {
        "openai" => {
            let key = cfg.api_key().ok_or_else(|| {
                LlmError::Config(format!("provider 'openai' needs an API key in ${}", cfg.api_key_env))
            })?;
            Ok(Arc::new(OpenAiBackend::new(key, &cfg.model)?))
        }
        "openai_compatible" | "openrouter" => {
            let mut backend = OpenAiCompatibleBackend::new(&cfg.base_url, &cfg.model, cfg.api_key())?;
            if let Some(referer) = &cfg.referer {
                backend = backend.with_header("HTTP-Referer", referer);
            }
            if let Some(title) = &cfg.title {
                backend = backend.with_header("X-Title", title);
            }
            Ok(Arc::new(backend))
        }
        "ollama" => Ok(Arc::new(OllamaBackend::new(&cfg.base_url, &cfg.model)?)),
        other => Err(LlmError::Config(format!("unknown LLM provider '{other}'"))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
