//! Shared text/image embedding space.
//!
//! Every vector that reaches the index goes through [`Embedding::from_raw`], which
//! L2-normalizes it, so cosine similarity between any two stored vectors reduces to a
//! dot product regardless of which modality produced them.

mod http;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpEmbedder;

/// Tolerance used when checking that a vector is unit length.
pub const NORM_TOLERANCE: f32 = 1e-5;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedder not initialized; call initialize() first")]
    NotInitialized,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding has zero or non-finite norm")]
    DegenerateVector,

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),
}

impl EmbeddingError {
    /// Whether the failure is tied to a single input item rather than the model itself.
    pub fn is_per_item(&self) -> bool {
        matches!(self, Self::InvalidImage(_) | Self::DegenerateVector)
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// A fixed-dimension, unit-length vector in the shared embedding space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize a raw model output into an embedding.
    pub fn from_raw(mut values: Vec<f32>) -> Result<Self> {
        let norm = l2_norm(&values);
        if values.is_empty() || !norm.is_finite() || norm == 0.0 {
            return Err(EmbeddingError::DegenerateVector);
        }
        for v in values.iter_mut() {
            *v /= norm;
        }
        Ok(Self(values))
    }

    /// Wrap values read back from storage; they were normalized on the way in.
    pub(crate) fn from_stored(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.0)
    }

    /// Cosine similarity with another embedding of the same dimension.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.0, &other.0)
    }

    /// Serialize as little-endian f32 bytes.
    pub(crate) fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from little-endian f32 bytes. The caller checks that `bytes`
    /// holds whole floats.
    pub(crate) fn from_le_bytes(bytes: &[u8]) -> Self {
        Self(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }
}

/// The embedding function contract: text and images in, comparable vectors out.
///
/// Model loading is an explicit step. Implementations must refuse to embed before
/// [`Embedder::initialize`] has succeeded so the first-use latency is never hidden.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;

    /// Load the model or verify the service is reachable.
    fn initialize(&self) -> Result<()>;

    fn is_ready(&self) -> bool;

    /// Dimension `D` of every vector this embedder produces.
    fn dimension(&self) -> usize;

    fn embed_text(&self, text: &str) -> Result<Embedding>;

    fn embed_image(&self, image: &DynamicImage) -> Result<Embedding>;

    /// Decode encoded image bytes and embed them.
    fn embed_image_bytes(&self, bytes: &[u8]) -> Result<Embedding> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| EmbeddingError::InvalidImage(e.to_string()))?;
        self.embed_image(&image)
    }
}

/// Truncate to at most `max_chars` characters, always on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Calculate cosine similarity between two vectors.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}
