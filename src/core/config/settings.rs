//! Typed view over the merged YAML configuration.

use std::env;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks handed to the response stage per query
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Local sentence-transformer model through fastembed
    #[serde(rename = "fastembed")]
    FastEmbed,
    /// Offline feature-hashing embedder, matches spelling only
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::FastEmbed,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            base_url: "http://127.0.0.1:8080".to_string(),
            api_key: None,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub cors_allowed_origins: Vec<String>,
}

impl Settings {
    pub fn from_value(value: Value) -> Result<Self, ApiError> {
        serde_json::from_value(value)
            .map_err(|err| ApiError::BadRequest(format!("Invalid config: {}", err)))
    }

    /// Environment variables win over both config files.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = non_empty_env("DOCQA_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = non_empty_env("DOCQA_LLM_MODEL") {
            self.llm.model = model;
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
