use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use sightline_lib::completion::ChatCompletionClient;
use sightline_lib::config::{default_data_dir, RagConfig};
use sightline_lib::embedding::{Embedder, HttpEmbedder};
use sightline_lib::rag::{
    Chunker, Generator, IndexLocation, IndexingPipeline, KnowledgeBase, Retriever,
    SharedKnowledgeBase,
};

/// Shared application state for CLI commands
pub struct App {
    pub config: RagConfig,
    pub knowledge_base: SharedKnowledgeBase,
    embedder: Arc<HttpEmbedder>,
}

impl App {
    /// Load configuration and open the knowledge base. Does not contact any service.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = RagConfig::load(config_path).context("Failed to load configuration")?;

        // The CLI always persists; fall back to the user data directory
        let location = match config.storage.index_location() {
            IndexLocation::InMemory => {
                let dir = default_data_dir().context("Failed to get data directory")?;
                IndexLocation::Persistent(dir)
            }
            persistent => persistent,
        };
        log::debug!("Using index at {:?}", location);

        let knowledge_base = KnowledgeBase::open(
            location,
            &config.storage.collection,
            config.embedding.dimension,
        )
        .context("Failed to open knowledge base")?
        .into_shared();

        let embedder = Arc::new(
            HttpEmbedder::new(&config.embedding).context("Failed to create embedding client")?,
        );

        Ok(Self {
            config,
            knowledge_base,
            embedder,
        })
    }

    /// The embedder, after confirming the model is reachable.
    fn ready_embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder
            .initialize()
            .context("Embedding model is not available")?;
        let embedder: Arc<dyn Embedder> = self.embedder.clone();
        Ok(embedder)
    }

    pub fn pipeline(&self) -> Result<IndexingPipeline> {
        let chunking = &self.config.chunking;
        let chunker = Chunker::new(chunking.chunk_size, chunking.chunk_overlap)?;
        Ok(IndexingPipeline::new(
            self.ready_embedder()?,
            self.knowledge_base.clone(),
            chunker,
        )?)
    }

    pub fn retriever(&self) -> Result<Retriever> {
        Ok(Retriever::new(
            self.ready_embedder()?,
            self.knowledge_base.clone(),
            self.config.retrieval.top_k,
        )?)
    }

    pub fn generator(&self) -> Result<Generator> {
        let completion = ChatCompletionClient::new(&self.config.completion)
            .context("Failed to create completion client")?;
        Ok(Generator::new(self.retriever()?, Arc::new(completion)))
    }
}
