use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::CociError;

const USER_AGENT: &str = concat!("coci/", env!("CARGO_PKG_VERSION"));

/// An HTTP client that only talks to approved hosts.
/// Every outbound call of the pipeline (generation, directory, embeddings) goes through it.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default allowlist of directory, LLM and model hosts.
    pub fn new() -> Result<Self, CociError> {
        let domains = [
            "api.openalex.org",        // OpenAlex directory
            "openrouter.ai",           // OpenRouter
            "api.openai.com",          // OpenAI
            "huggingface.co",          // HuggingFace models
            "cdn-lfs.huggingface.co",  // HuggingFace LFS
            "localhost",               // Ollama / local embedding servers
            "127.0.0.1",
        ];
        let allowlist = domains.iter().map(|d| d.to_string()).collect();

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CociError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Allows the host of a configured base URL (self-hosted endpoints).
    pub fn allow_base_url(&mut self, base_url: &str) -> Result<(), CociError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| CociError::Config(format!("invalid base URL {base_url}: {e}")))?;
        match parsed.host_str() {
            Some(host) => {
                self.allow_domain(host);
                Ok(())
            }
            None => Err(CociError::Config(format!("base URL has no host: {base_url}"))),
        }
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Check exact match or if it's a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, CociError> {
        self.request(reqwest::Method::GET, url)
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, CociError> {
        self.request(reqwest::Method::POST, url)
    }

    pub fn request(&self, method: reqwest::Method, url: &str) -> Result<reqwest::RequestBuilder, CociError> {
        if !self.is_allowed(url) {
            return Err(CociError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.request(method, url))
    }
}
