//! Multimodal retrieval-augmented generation: indexing, retrieval and prompt assembly.

mod assembler;
mod chunker;
mod images;
mod index;
mod models;
mod pipeline;
mod retriever;
mod store;

pub use assembler::{build_prompt, Answer, Generator};
pub use chunker::{Chunker, TextWindow};
pub use images::{ImageBlob, ImageBlobStore, PNG_MIME};
pub use index::{IndexError, IndexLocation, VectorIndex, INDEX_DB_FILE};
pub use models::{
    ContentKind, Fragment, FragmentContent, FragmentMetadata, IndexStats, RetrievedRecord,
    DEFAULT_PREVIEW_CHARS,
};
pub use pipeline::{IndexingPipeline, IngestReport, STANDALONE_IMAGE_PREFIX};
pub use retriever::Retriever;
pub use store::{lock, IngestBatch, KnowledgeBase, SharedKnowledgeBase};
