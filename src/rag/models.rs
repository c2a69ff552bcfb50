//! Data models for RAG operations.

use serde::{Deserialize, Serialize};

/// Length of the lexical preview shown for text evidence.
pub const DEFAULT_PREVIEW_CHARS: usize = 220;

/// What a fragment carries. Exactly one payload kind per fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "contentKind", rename_all = "camelCase")]
pub enum FragmentContent {
    /// A chunk of page text, used verbatim in prompts.
    Text { text: String },
    /// An extracted image; the payload lives in the image blob store.
    Image { image_ref: String },
}

/// Discriminant of [`FragmentContent`], persisted as the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A unit of indexed content with its page provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    /// Zero-based page the content came from
    pub page: u32,
    #[serde(flatten)]
    pub content: FragmentContent,
}

impl Fragment {
    pub fn text(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            content: FragmentContent::Text { text: text.into() },
        }
    }

    pub fn image(page: u32, image_ref: impl Into<String>) -> Self {
        Self {
            page,
            content: FragmentContent::Image {
                image_ref: image_ref.into(),
            },
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self.content {
            FragmentContent::Text { .. } => ContentKind::Text,
            FragmentContent::Image { .. } => ContentKind::Image,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            FragmentContent::Text { text } => Some(text),
            FragmentContent::Image { .. } => None,
        }
    }

    pub fn image_ref(&self) -> Option<&str> {
        match &self.content {
            FragmentContent::Text { .. } => None,
            FragmentContent::Image { image_ref } => Some(image_ref),
        }
    }

    /// Metadata map persisted alongside the vector.
    pub fn metadata(&self) -> FragmentMetadata {
        FragmentMetadata {
            content_kind: self.kind(),
            page: self.page,
            image_ref: self.image_ref().map(str::to_string),
        }
    }
}

/// Metadata stored with every record: `{content_kind, page, image_ref?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    pub content_kind: ContentKind,
    pub page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// A fragment returned from a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedRecord {
    /// Id assigned when the fragment was inserted
    pub id: String,
    pub fragment: Fragment,
    /// Cosine distance to the query (smaller is more similar)
    pub distance: f32,
}

impl RetrievedRecord {
    pub fn page(&self) -> u32 {
        self.fragment.page
    }

    pub fn kind(&self) -> ContentKind {
        self.fragment.kind()
    }

    /// Short human-readable preview for citation lists.
    pub fn preview(&self, max_chars: usize) -> String {
        match &self.fragment.content {
            FragmentContent::Text { text } => {
                if text.chars().count() > max_chars {
                    let cut: String = text.chars().take(max_chars).collect();
                    format!("{}…", cut)
                } else {
                    text.clone()
                }
            }
            FragmentContent::Image { image_ref } => format!("[Image: {}]", image_ref),
        }
    }
}

/// Statistics about a knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub collection: String,
    pub fragment_count: u64,
    pub text_count: u64,
    pub image_count: u64,
    pub image_blob_count: u64,
    pub dimension: usize,
}
