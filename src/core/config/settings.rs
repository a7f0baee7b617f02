//! Typed application configuration loaded from `config.yml`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub completion: ProviderConfig,
    pub embedding: ProviderConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// One model endpoint. The completion and embedding providers are
/// configured independently so a hosted completion API can be paired
/// with a local embedding server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider kind: "openai" (OpenAI-compatible HTTP) or "ollama".
    pub kind: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key, if any.
    pub api_key_env: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbors requested per round on the multi-query path.
    pub multi_query_results: usize,
    /// Neighbors requested for the single-round fallback.
    pub fallback_results: usize,
    /// Upper bound on reformulated queries per question.
    pub max_expansions: usize,
    /// Soft word ceiling passed to the synthesis instruction.
    pub max_answer_words: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            base_url: "https://api.groq.com/openai".to_string(),
            model: "llama3-8b-8192".to_string(),
            api_key_env: Some("GROQ_API_KEY".to_string()),
            request_timeout_secs: 60,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            multi_query_results: 2,
            fallback_results: 4,
            max_expansions: 3,
            max_answer_words: 500,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            completion: ProviderConfig::default(),
            embedding: ProviderConfig {
                kind: "ollama".to_string(),
                base_url: "http://localhost:11434".to_string(),
                model: "nomic-embed-text".to_string(),
                api_key_env: None,
                request_timeout_secs: 60,
            },
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the config file, falling back to defaults when it is absent.
    /// A present but malformed file is an error, not a silent default.
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ApiError::internal(format!("Failed to read {}: {}", path.display(), e)))?;

        serde_yaml::from_str(&contents)
            .map_err(|e| ApiError::internal(format!("Invalid config {}: {}", path.display(), e)))
    }
}

impl ProviderConfig {
    /// Resolves the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }
}
