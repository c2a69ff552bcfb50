//! Multimodal document indexing and retrieval-augmented question answering.
//!
//! Documents are decomposed into page text and images, embedded into one shared
//! vector space, and stored in a [`rag::KnowledgeBase`]. Questions are answered by
//! retrieving the nearest fragments and handing them, text and images together, to a
//! completion model.

pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod rag;

#[cfg(test)]
mod test_support;

pub use config::RagConfig;
pub use error::{RagError, Result};
