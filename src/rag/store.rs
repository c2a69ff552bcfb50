//! The vector index and image blob store, kept as one unit.
//!
//! Both halves are private to [`KnowledgeBase`]: every reset clears them together
//! and every insert writes them in the same transaction, so an image fragment can
//! never point at a missing payload.

use std::sync::{Arc, Mutex, MutexGuard};

use super::images::{ImageBlob, ImageBlobStore};
use super::index::{IndexLocation, VectorIndex};
use super::models::{Fragment, IndexStats, RetrievedRecord};
use crate::embedding::Embedding;
use crate::error::{RagError, Result};

/// Knowledge base shared between the indexing pipeline and the retriever.
pub type SharedKnowledgeBase = Arc<Mutex<KnowledgeBase>>;

/// Acquire the knowledge base lock.
pub fn lock(store: &SharedKnowledgeBase) -> Result<MutexGuard<'_, KnowledgeBase>> {
    store
        .lock()
        .map_err(|e| RagError::LockPoisoned(e.to_string()))
}

/// Fragments, their embeddings, and the image payloads they reference.
#[derive(Debug, Default)]
pub struct IngestBatch {
    pub fragments: Vec<Fragment>,
    pub embeddings: Vec<Embedding>,
    pub images: Vec<(String, ImageBlob)>,
}

impl IngestBatch {
    pub fn push_text(&mut self, page: u32, text: String, embedding: Embedding) {
        self.fragments.push(Fragment::text(page, text));
        self.embeddings.push(embedding);
    }

    pub fn push_image(&mut self, page: u32, image_ref: String, blob: ImageBlob, embedding: Embedding) {
        self.fragments.push(Fragment::image(page, image_ref.clone()));
        self.embeddings.push(embedding);
        self.images.push((image_ref, blob));
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

pub struct KnowledgeBase {
    index: VectorIndex,
    images: ImageBlobStore,
}

impl KnowledgeBase {
    /// Open a collection and load its image payloads.
    pub fn open(location: IndexLocation, collection: &str, dimension: usize) -> Result<Self> {
        let index = VectorIndex::open(location, collection, dimension)?;
        Self::from_index(index)
    }

    pub fn from_index(index: VectorIndex) -> Result<Self> {
        let images = index.load_images()?;
        Ok(Self { index, images })
    }

    pub fn into_shared(self) -> SharedKnowledgeBase {
        Arc::new(Mutex::new(self))
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn collection(&self) -> &str {
        self.index.collection()
    }

    /// Insert a batch in one index call. Every image fragment must come with its payload.
    pub fn insert(&mut self, batch: IngestBatch) -> Result<Vec<String>> {
        self.check_payloads(&batch, true)?;

        let ids = self
            .index
            .add_with_images(&batch.fragments, &batch.embeddings, &batch.images)?;
        for (image_ref, blob) in batch.images {
            self.images.insert(image_ref, blob);
        }
        Ok(ids)
    }

    /// Swap the whole contents for `batch` in one index transaction.
    ///
    /// If the write fails, both halves keep their previous contents.
    pub fn replace(&mut self, batch: IngestBatch) -> Result<Vec<String>> {
        self.check_payloads(&batch, false)?;

        let ids = self
            .index
            .replace_with_images(&batch.fragments, &batch.embeddings, &batch.images)?;
        self.images = batch.images.into_iter().collect();
        Ok(ids)
    }

    fn check_payloads(&self, batch: &IngestBatch, keep_existing: bool) -> Result<()> {
        for fragment in &batch.fragments {
            if let Some(image_ref) = fragment.image_ref() {
                let in_batch = batch.images.iter().any(|(r, _)| r == image_ref);
                if !in_batch && !(keep_existing && self.images.contains(image_ref)) {
                    return Err(RagError::MissingImagePayload(image_ref.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Drop every fragment and every image payload.
    pub fn clear(&mut self) -> Result<()> {
        self.index.clear()?;
        self.images.clear();
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.index.count()?)
    }

    pub fn query(&self, embedding: &Embedding, k: usize) -> Result<Vec<RetrievedRecord>> {
        Ok(self.index.query(embedding, k)?)
    }

    /// Query and copy out the payloads of the returned image records in one
    /// borrow, so the records and blobs always come from the same contents.
    pub fn query_with_images(
        &self,
        embedding: &Embedding,
        k: usize,
    ) -> Result<(Vec<RetrievedRecord>, ImageBlobStore)> {
        let records = self.index.query(embedding, k)?;
        let images = records
            .iter()
            .filter_map(|r| r.fragment.image_ref())
            .filter_map(|image_ref| {
                self.images
                    .get(image_ref)
                    .map(|blob| (image_ref.to_string(), blob.clone()))
            })
            .collect();
        Ok((records, images))
    }

    pub fn images(&self) -> &ImageBlobStore {
        &self.images
    }

    pub fn image(&self, image_ref: &str) -> Option<&ImageBlob> {
        self.images.get(image_ref)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        Ok(self.index.stats()?)
    }
}
