//! Runtime configuration: defaults, then an optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rag::IndexLocation;

const APP_DIR: &str = "sightline";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Base URL of the multimodal embedding service
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    /// Text inputs longer than this are truncated before embedding
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.jina.ai/v1".to_string(),
            api_key: None,
            model: "jina-clip-v2".to_string(),
            dimension: 512,
            max_input_chars: 2048,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the index database. `None` keeps the index in memory.
    pub location: Option<PathBuf>,
    pub collection: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            location: None,
            collection: "multimodal_rag".to_string(),
        }
    }
}

impl StorageSettings {
    pub fn index_location(&self) -> IndexLocation {
        IndexLocation::from_option(self.location.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    /// Base URL of an OpenAI-compatible chat completions API
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "openai/gpt-4o".to_string(),
            max_tokens: 100,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding: EmbeddingSettings,
    pub storage: StorageSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub completion: CompletionSettings,
}

impl RagConfig {
    /// Load configuration from `path` (or the default location when it exists) and
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.completion.endpoint = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            self.completion.max_tokens = parse_env("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_API_BASE") {
            self.embedding.endpoint = v;
        }
        if let Some(v) = get("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Some(v) = get("EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_env("EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = get("INDEX_DIR") {
            self.storage.location = Some(PathBuf::from(v));
        }
        if let Some(v) = get("COLLECTION_NAME") {
            self.storage.collection = v;
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("TOP_K") {
            self.retrieval.top_k = parse_env("TOP_K", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if self.storage.collection.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Default directory for the persistent index.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_DIR))
}
