//! coci-llm: text-generation backends.
//!
//! One [`backend::LlmBackend`] trait over OpenAI, OpenAI-compatible endpoints
//! (OpenRouter, vLLM, LM Studio, …) and local Ollama. Requests may carry a
//! strict JSON-schema response format, which is how the extraction stage gets
//! structured output.

pub mod backend;

pub use backend::{
    backend_from_config, JsonSchemaFormat, LlmBackend, LlmError, LlmRequest, LlmResponse,
    Message, OllamaBackend, OpenAiBackend, OpenAiCompatibleBackend, ResponseFormat,
};
