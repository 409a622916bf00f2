use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParlanceError, Result};

/// Top-level configuration for the Parlance service.
///
/// Loaded from `~/.parlance/config.toml` by default. Provider sections are
/// optional: an absent section means the capability is not available and the
/// router degrades instead of failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParlanceConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub routing: RouterSettings,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl ParlanceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParlanceConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParlanceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP API port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.parlance/data".to_string(),
            log_level: "info".to_string(),
            port: 3040,
        }
    }
}

/// Service-wide router limits. Per-bot policy lives in `RoutingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Utterances longer than this many characters are rejected.
    pub max_message_length: usize,
    /// In llm_first mode, generations below this confidence fall back.
    pub llm_first_min_confidence: f32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            llm_first_min_confidence: 0.5,
        }
    }
}

/// Which qualifying chunk the lexical retriever returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalStrategy {
    /// First chunk in storage order that clears the match bar.
    #[default]
    FirstMatch,
    /// Chunk with the most matched query tokens; ties go to storage order.
    BestScore,
}

/// Knowledge retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub lexical_strategy: LexicalStrategy,
    /// Maximum vector hits per query.
    pub vector_limit: usize,
    /// Cosine similarity floor for vector hits.
    pub vector_min_score: f64,
    /// Maximum chunks injected into a generation prompt.
    pub grounding_limit: usize,
    /// Timeout for query embedding plus vector search.
    pub embedding_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_strategy: LexicalStrategy::FirstMatch,
            vector_limit: 5,
            vector_min_score: 0.5,
            grounding_limit: 5,
            embedding_timeout_secs: 10,
        }
    }
}

/// Wire protocol spoken by a generative provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` (OpenAI, Groq, Ollama, vLLM, ...).
    OpenAi,
    /// Anthropic `/v1/messages`.
    Anthropic,
}

/// Connection settings for one generative provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Base URL; each kind has its own default.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key. `None` for keyless endpoints.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key from the environment.
    ///
    /// Returns `Ok(None)` when no key is required and a `Config` error when
    /// the named variable is unset or empty.
    pub fn api_key(&self) -> Result<Option<String>> {
        resolve_env_key(self.api_key_env.as_deref())
    }
}

/// Generative responder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Per-provider request timeout.
    pub request_timeout_secs: u64,
    /// Upper bound on history messages placed in the prompt.
    pub history_turns: usize,
    pub primary: Option<ProviderConfig>,
    pub secondary: Option<ProviderConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            history_turns: 10,
            primary: None,
            secondary: None,
        }
    }
}

/// Embedding provider settings (OpenAI-compatible `/embeddings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Provider ceiling; batch embedding is spaced to stay under it.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Prepended to queries (e.g. "search_query: ").
    #[serde(default)]
    pub query_prefix: Option<String>,
    /// Prepended to documents at ingestion (e.g. "search_document: ").
    #[serde(default)]
    pub document_prefix: Option<String>,
}

impl EmbeddingConfig {
    pub fn api_key(&self) -> Result<Option<String>> {
        resolve_env_key(self.api_key_env.as_deref())
    }
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_requests_per_minute() -> u32 {
    60
}

/// Document chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

fn resolve_env_key(var: Option<&str>) -> Result<Option<String>> {
    let Some(var) = var else {
        return Ok(None);
    };
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value)),
        _ => Err(ParlanceError::Config(format!(
            "environment variable {} is not set",
            var
        ))),
    }
}
