//! Configuration for the CfP pipeline.
//!
//! Read from `coci.toml` in the current directory, or the path in the
//! `COCI_CONFIG` env var. Every section has defaults, so a partial file (or
//! an empty one) is valid. API keys never live in the file: each backend names
//! the environment variable that holds its key, and `.env` is honoured.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{CociError, Result};

/// Complete pipeline configuration, passed explicitly into the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CociConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub event: EventDefaults,
    #[serde(default)]
    pub output: OutputConfig,
}

// ── Text generation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `openai` | `openai_compatible` | `ollama`
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    /// Sent as `HTTP-Referer` (OpenRouter app attribution).
    #[serde(default)]
    pub referer: Option<String>,
    /// Sent as `X-Title` (OpenRouter app attribution).
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_llm_provider() -> String { "openai_compatible".to_string() }
fn default_llm_base_url() -> String { "https://openrouter.ai/api".to_string() }
fn default_llm_model()    -> String { "openai/gpt-4o".to_string() }
fn default_llm_key_env()  -> String { "COCI_LLM_API_KEY".to_string() }
fn default_max_tokens()   -> u32    { 4096 }
fn default_temperature()  -> f32    { 0.0 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_llm_key_env(),
            referer: None,
            title: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<SecretString> {
        secret_from_env(&self.api_key_env)
    }
}

// ── Directory ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub base_url: String,
    /// Contact address for the polite pool.
    #[serde(default)]
    pub mailto: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    /// Log and skip directory transport errors instead of aborting the run.
    #[serde(default)]
    pub tolerate_errors: bool,
}

fn default_directory_url() -> String { "https://api.openalex.org".to_string() }
fn default_per_page()      -> usize  { 25 }

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
            mailto: None,
            per_page: default_per_page(),
            tolerate_errors: false,
        }
    }
}

// ── Embeddings ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// In-process BERT sentence encoder.
    Local,
    /// Any `/v1/embeddings` endpoint.
    OpenAiCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,
    /// Must be the model the snapshots were indexed with.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub use_gpu: bool,
}

fn default_embedding_backend() -> EmbeddingBackend { EmbeddingBackend::Local }
fn default_embedding_model()   -> String { "sentence-transformers/all-MiniLM-L6-v2".to_string() }
fn default_embedding_key_env() -> String { "COCI_EMBEDDING_API_KEY".to_string() }
fn default_batch_size()        -> usize  { 32 }

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            base_url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            use_gpu: false,
        }
    }
}

impl EmbeddingSettings {
    pub fn api_key(&self) -> Option<SecretString> {
        secret_from_env(&self.api_key_env)
    }
}

// ── Snapshots ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_dblp_file")]
    pub dblp: String,
    #[serde(default = "default_aida_file")]
    pub aida: String,
    #[serde(default = "default_confident_file")]
    pub confident: String,
    #[serde(default = "default_topics_file")]
    pub topics: String,
    /// Abort the run when a snapshot cannot be loaded.
    #[serde(default)]
    pub required: bool,
}

fn default_snapshot_dir()    -> PathBuf { PathBuf::from("./snapshots") }
fn default_dblp_file()       -> String  { "dblp.json".to_string() }
fn default_aida_file()       -> String  { "aida.json".to_string() }
fn default_confident_file()  -> String  { "confident.json".to_string() }
fn default_topics_file()     -> String  { "topics.json".to_string() }

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            dblp: default_dblp_file(),
            aida: default_aida_file(),
            confident: default_confident_file(),
            topics: default_topics_file(),
            required: false,
        }
    }
}

impl SnapshotConfig {
    pub fn path_for(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

// ── Thresholds ───────────────────────────────────────────────────────────────

/// Matching cut-offs. Distances are squared L2 over unit vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_conference_distance")]
    pub conference_max_distance: f32,
    #[serde(default = "default_topic_distance")]
    pub topic_max_distance: f32,
    #[serde(default = "default_topic_k")]
    pub topic_k: usize,
    /// Minimum token-set ratio (0–100) to corroborate an extracted affiliation.
    #[serde(default = "default_affiliation_fuzzy")]
    pub affiliation_fuzzy_min: f64,
    /// Largest gap between event year and an affiliation's active years.
    #[serde(default = "default_year_gap")]
    pub affiliation_max_year_gap: u32,
    /// organisers / distinct affiliations at or above which affiliations are discarded.
    #[serde(default = "default_screen_ratio")]
    pub affiliation_screen_ratio: f64,
}

fn default_conference_distance() -> f32 { 0.4 }
fn default_topic_distance()      -> f32 { 0.6 }
fn default_topic_k()             -> usize { 5 }
fn default_affiliation_fuzzy()   -> f64 { 40.0 }
fn default_year_gap()            -> u32 { 10 }
fn default_screen_ratio()        -> f64 { 4.0 }

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            conference_max_distance: default_conference_distance(),
            topic_max_distance: default_topic_distance(),
            topic_k: default_topic_k(),
            affiliation_fuzzy_min: default_affiliation_fuzzy(),
            affiliation_max_year_gap: default_year_gap(),
            affiliation_screen_ratio: default_screen_ratio(),
        }
    }
}

// ── Event defaults ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDefaults {
    /// Year assumed when the CfP states none. Falls back to the current year.
    #[serde(default)]
    pub default_year: Option<i32>,
    #[serde(default = "default_track")]
    pub default_track: String,
    #[serde(default = "default_catch_all_track")]
    pub catch_all_track: String,
}

fn default_track()           -> String { "main".to_string() }
fn default_catch_all_track() -> String { "Other".to_string() }

impl Default for EventDefaults {
    fn default() -> Self {
        Self {
            default_year: None,
            default_track: default_track(),
            catch_all_track: default_catch_all_track(),
        }
    }
}

impl EventDefaults {
    pub fn year(&self) -> i32 {
        self.default_year.unwrap_or_else(|| chrono::Utc::now().year())
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_destination")]
    pub destination_folder: PathBuf,
}

fn default_destination() -> PathBuf { PathBuf::from("./results") }

impl Default for OutputConfig {
    fn default() -> Self {
        Self { destination_folder: default_destination() }
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

impl CociConfig {
    /// Load configuration from coci.toml.
    /// Checks COCI_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var("COCI_CONFIG").unwrap_or_else(|_| "coci.toml".to_string());
        Self::load_from(&path)
    }

    /// Load `path`. A `.env` beside it, then one in the working directory,
    /// is read first so the key variables it names resolve.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            let _ = dotenvy::from_path(dir.join(".env"));
        }
        let _ = dotenvy::dotenv();
        if !path.exists() {
            return Err(CociError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CociError::Config(e.to_string()))
    }
}

fn secret_from_env(var: &str) -> Option<SecretString> {
    std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let cfg = CociConfig::from_toml("").unwrap();
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert_eq!(cfg.event.default_track, "main");
        assert_eq!(cfg.event.catch_all_track, "Other");
        assert_eq!(cfg.embedding.backend, EmbeddingBackend::Local);
    }

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert!((t.conference_max_distance - 0.4).abs() < 1e-6);
        assert!((t.topic_max_distance - 0.6).abs() < 1e-6);
        assert_eq!(t.topic_k, 5);
        assert_eq!(t.affiliation_fuzzy_min, 40.0);
        assert_eq!(t.affiliation_max_year_gap, 10);
        assert_eq!(t.affiliation_screen_ratio, 4.0);
    }

    #[test]
    fn test_partial_sections_override() {
        let cfg = CociConfig::from_toml(
            r#"
            [thresholds]
            affiliation_fuzzy_min = 70.0

            [event]
            default_year = 2026

            [snapshots]
            dir = "/data/snapshots"
            required = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.thresholds.affiliation_fuzzy_min, 70.0);
        assert_eq!(cfg.thresholds.topic_k, 5);
        assert_eq!(cfg.event.year(), 2026);
        assert!(cfg.snapshots.required);
        assert_eq!(cfg.snapshots.path_for("dblp.json"), PathBuf::from("/data/snapshots/dblp.json"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = CociConfig::load_from("/definitely/not/here/coci.toml").unwrap_err();
        assert!(matches!(err, CociError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coci.toml");
        std::fs::write(&path, "[llm]\nmodel = \"openai/gpt-4o-mini\"\n").unwrap();
        let cfg = CociConfig::load_from(&path).unwrap();
        assert_eq!(cfg.llm.model, "openai/gpt-4o-mini");
        assert_eq!(cfg.llm.provider, "openai_compatible");
    }

    #[test]
    fn test_load_from_reads_adjacent_dotenv() {
        use secrecy::ExposeSecret;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coci.toml");
        std::fs::write(&path, "[llm]\napi_key_env = \"COCI_DOTENV_TEST_KEY\"\n").unwrap();
        std::fs::write(dir.path().join(".env"), "COCI_DOTENV_TEST_KEY=sk-from-dotenv\n").unwrap();

        let cfg = CociConfig::load_from(&path).unwrap();
        let key = cfg.llm.api_key().unwrap();
        assert_eq!(key.expose_secret(), "sk-from-dotenv");
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = CociConfig::from_toml(include_str!("../../../coci.example.toml")).unwrap();
        assert_eq!(cfg.thresholds, Thresholds::default());
        assert_eq!(cfg.llm.title.as_deref(), Some("COCI"));
        assert_eq!(cfg.embedding.backend, EmbeddingBackend::Local);
    }
}
