//! Indexing pipeline: document → chunks and images → embeddings → knowledge base.

use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;

use super::chunker::Chunker;
use super::images::ImageBlob;
use super::store::{lock, IngestBatch, SharedKnowledgeBase};
use crate::document::{DocumentSource, ImageOutcome, PageContent, SkippedImage};
use crate::embedding::{Embedder, EmbeddingError};
use crate::error::{RagError, Result};

/// Prefix of the `image_ref` given to images ingested on their own.
pub const STANDALONE_IMAGE_PREFIX: &str = "standalone_image_";

/// Coarse outcome of one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub text_fragments: usize,
    pub image_fragments: usize,
    pub skipped_images: Vec<SkippedImage>,
}

impl IngestReport {
    pub fn total_fragments(&self) -> usize {
        self.text_fragments + self.image_fragments
    }
}

/// Builds the knowledge base from documents, plain text, or single images.
pub struct IndexingPipeline {
    embedder: Arc<dyn Embedder>,
    store: SharedKnowledgeBase,
    chunker: Chunker,
}

impl IndexingPipeline {
    /// Fails if the embedder's dimension differs from the knowledge base's.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: SharedKnowledgeBase,
        chunker: Chunker,
    ) -> Result<Self> {
        let index_dimension = lock(&store)?.dimension();
        if embedder.dimension() != index_dimension {
            return Err(RagError::EmbedderMismatch {
                embedder: embedder.dimension(),
                index: index_dimension,
            });
        }
        Ok(Self {
            embedder,
            store,
            chunker,
        })
    }

    pub fn store(&self) -> &SharedKnowledgeBase {
        &self.store
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Replace the knowledge base contents with `document`.
    ///
    /// Malformed images are skipped and listed in the report. Any other failure
    /// aborts the ingestion and leaves the previous contents untouched.
    pub fn ingest_document(&self, document: &dyn DocumentSource) -> Result<IngestReport> {
        let decomposed = document.decompose()?;
        log::info!("Ingesting document with {} pages", decomposed.pages.len());

        let mut batch = IngestBatch::default();
        let mut report = IngestReport::default();
        for page in &decomposed.pages {
            self.embed_page(page, &mut batch, &mut report)?;
        }

        self.replace_contents(batch)?;
        log_report(&report);
        Ok(report)
    }

    /// Replace the knowledge base contents with plain text, treated as page 0.
    pub fn ingest_text(&self, text: &str) -> Result<IngestReport> {
        let mut batch = IngestBatch::default();
        let mut report = IngestReport::default();
        self.embed_page(&PageContent::new(0, text), &mut batch, &mut report)?;

        self.replace_contents(batch)?;
        log_report(&report);
        Ok(report)
    }

    /// Replace the knowledge base contents with a single encoded image.
    pub fn ingest_image(&self, bytes: &[u8]) -> Result<IngestReport> {
        let image = decode_image(bytes)?;
        let mut batch = IngestBatch::default();
        self.push_image(&mut batch, 0, format!("{}0", STANDALONE_IMAGE_PREFIX), &image)?;

        self.replace_contents(batch)?;
        Ok(IngestReport {
            image_fragments: 1,
            ..IngestReport::default()
        })
    }

    /// Add text to the existing contents without clearing.
    pub fn append_text(&self, page: u32, text: &str) -> Result<IngestReport> {
        let mut batch = IngestBatch::default();
        let mut report = IngestReport::default();
        self.embed_page(&PageContent::new(page, text), &mut batch, &mut report)?;

        if !batch.is_empty() {
            lock(&self.store)?.insert(batch)?;
        }
        Ok(report)
    }

    /// Add a single encoded image to the existing contents without clearing.
    ///
    /// Returns the `image_ref` it was stored under.
    pub fn append_image(&self, page: u32, bytes: &[u8]) -> Result<String> {
        let image = decode_image(bytes)?;

        let mut store = lock(&self.store)?;
        let image_ref = (0..)
            .map(|n| format!("{}{}", STANDALONE_IMAGE_PREFIX, n))
            .find(|candidate| !store.images().contains(candidate))
            .unwrap_or_else(|| STANDALONE_IMAGE_PREFIX.to_string());

        let mut batch = IngestBatch::default();
        self.push_image(&mut batch, page, image_ref.clone(), &image)?;
        store.insert(batch)?;
        Ok(image_ref)
    }

    fn embed_page(
        &self,
        page: &PageContent,
        batch: &mut IngestBatch,
        report: &mut IngestReport,
    ) -> Result<()> {
        if page.has_text() {
            for chunk in self.chunker.split(&page.text) {
                if chunk.trim().is_empty() {
                    log::debug!("Skipping blank chunk on page {}", page.page);
                    continue;
                }
                let embedding = self.embedder.embed_text(&chunk)?;
                batch.push_text(page.page, chunk, embedding);
                report.text_fragments += 1;
            }
        }

        for outcome in &page.images {
            match outcome {
                ImageOutcome::Extracted(extracted) => {
                    match self.push_image(
                        batch,
                        page.page,
                        extracted.image_ref.clone(),
                        &extracted.image,
                    ) {
                        Ok(()) => report.image_fragments += 1,
                        Err(RagError::Embedding(e)) if e.is_per_item() => {
                            log::warn!(
                                "Could not process image {} on page {}: {}",
                                extracted.position,
                                page.page,
                                e
                            );
                            report.skipped_images.push(SkippedImage {
                                page: page.page,
                                position: extracted.position,
                                reason: e.to_string(),
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                ImageOutcome::Skipped(skipped) => report.skipped_images.push(skipped.clone()),
            }
        }
        Ok(())
    }

    fn push_image(
        &self,
        batch: &mut IngestBatch,
        page: u32,
        image_ref: String,
        image: &DynamicImage,
    ) -> Result<()> {
        let blob = ImageBlob::from_image(image)
            .map_err(|e| EmbeddingError::InvalidImage(e.to_string()))?;
        let embedding = self.embedder.embed_image(image)?;
        batch.push_image(page, image_ref, blob, embedding);
        Ok(())
    }

    /// Clear and repopulate under one lock so no reader sees the gap.
    fn replace_contents(&self, batch: IngestBatch) -> Result<()> {
        lock(&self.store)?.replace(batch)?;
        Ok(())
    }
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| RagError::Embedding(EmbeddingError::InvalidImage(e.to_string())))
}

fn log_report(report: &IngestReport) {
    log::info!(
        "Indexed {} text and {} image fragments ({} images skipped)",
        report.text_fragments,
        report.image_fragments,
        report.skipped_images.len()
    );
}
