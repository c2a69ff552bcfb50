//! Multimodal prompts and the completion models that answer them.

mod chat;

use serde::Serialize;
use thiserror::Error;

pub use chat::ChatCompletionClient;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Invalid completion configuration: {0}")]
    Configuration(String),

    #[error("Completion response contained no answer")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, CompletionError>;

/// One ordered part of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PromptSegment {
    Text { text: String },
    Image { mime: String, data: String },
}

impl PromptSegment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// A single user message made of text and image segments, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub segments: Vec<PromptSegment>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.segments.push(PromptSegment::text(text));
    }

    pub fn push_image(&mut self, mime: impl Into<String>, data: impl Into<String>) {
        self.segments.push(PromptSegment::Image {
            mime: mime.into(),
            data: data.into(),
        });
    }

    pub fn image_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PromptSegment::Image { .. }))
            .count()
    }

    /// Concatenation of the text segments.
    pub fn text(&self) -> String {
        self.segments.iter().filter_map(PromptSegment::as_text).collect()
    }
}

/// A language model that turns a multimodal prompt into an answer.
pub trait CompletionModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn complete(&self, prompt: &Prompt) -> Result<String>;
}
