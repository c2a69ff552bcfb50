//! Crate-level error type.

use thiserror::Error;

use crate::completion::CompletionError;
use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::embedding::EmbeddingError;
use crate::rag::IndexError;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("top-k must be at least 1, got {0}")]
    InvalidTopK(usize),

    #[error("Invalid chunking: chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidChunking {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error("Embedder dimension ({embedder}) does not match index dimension ({index})")]
    EmbedderMismatch { embedder: usize, index: usize },

    #[error("Image fragment '{0}' has no payload in the batch")]
    MissingImagePayload(String),

    #[error("Failed to acquire knowledge base lock: {0}")]
    LockPoisoned(String),
}

impl RagError {
    /// Caller-side mistakes that were rejected before anything was mutated.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::InvalidTopK(_)
            | Self::InvalidChunking { .. }
            | Self::EmbedderMismatch { .. }
            | Self::MissingImagePayload(_) => true,
            Self::Index(e) => e.is_validation(),
            Self::Embedding(EmbeddingError::DimensionMismatch { .. }) => true,
            Self::Config(ConfigError::Invalid(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
