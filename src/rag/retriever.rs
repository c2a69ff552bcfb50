use std::sync::Arc;

use super::images::ImageBlobStore;
use super::models::RetrievedRecord;
use super::store::{lock, SharedKnowledgeBase};
use crate::embedding::{Embedder, Embedding};
use crate::error::{RagError, Result};

/// Embeds a query with the index-time embedder and finds its nearest fragments.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: SharedKnowledgeBase,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: SharedKnowledgeBase, top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::InvalidTopK(top_k));
        }
        Ok(Self {
            embedder,
            store,
            top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embed_query(&self, query: &str) -> Result<Embedding> {
        Ok(self.embedder.embed_text(query)?)
    }

    /// Retrieve with the configured top-k.
    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievedRecord>> {
        self.retrieve_k(query, self.top_k)
    }

    /// Retrieve at most `k` records, nearest first.
    pub fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<RetrievedRecord>> {
        if k == 0 {
            return Err(RagError::InvalidTopK(k));
        }
        let embedding = self.embed_query(query)?;
        let records = lock(&self.store)?.query(&embedding, k)?;
        log::debug!("Retrieved {} records for query (k={})", records.len(), k);
        Ok(records)
    }

    /// Like [`Retriever::retrieve_k`], also returning the payloads of the image
    /// records. Both are read under a single lock.
    pub fn retrieve_with_images(
        &self,
        query: &str,
        k: usize,
    ) -> Result<(Vec<RetrievedRecord>, ImageBlobStore)> {
        if k == 0 {
            return Err(RagError::InvalidTopK(k));
        }
        let embedding = self.embed_query(query)?;
        let (records, images) = lock(&self.store)?.query_with_images(&embedding, k)?;
        log::debug!(
            "Retrieved {} records and {} image payloads (k={})",
            records.len(),
            images.len(),
            k
        );
        Ok((records, images))
    }
}
