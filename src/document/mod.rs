//! Document decomposition into per-page text and embedded images.

mod pdf;

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;

pub use pdf::PdfDocument;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load PDF: {0}")]
    Pdf(String),

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

/// Identifier for the `position`-th image on zero-based `page`.
pub fn image_ref(page: u32, position: usize) -> String {
    format!("page_{}_img_{}", page, position)
}

/// An image extracted from a page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image_ref: String,
    /// Position among all images on the page, including skipped ones
    pub position: usize,
    pub image: DynamicImage,
}

/// An image that could not be extracted or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedImage {
    pub page: u32,
    pub position: usize,
    pub reason: String,
}

/// Per-image extraction result.
#[derive(Debug, Clone)]
pub enum ImageOutcome {
    Extracted(PageImage),
    Skipped(SkippedImage),
}

/// Text block and images of one page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// Zero-based page index
    pub page: u32,
    pub text: String,
    pub images: Vec<ImageOutcome>,
}

impl PageContent {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
            images: Vec::new(),
        }
    }

    /// Append an image at the next position on this page.
    pub fn with_image(mut self, image: DynamicImage) -> Self {
        let position = self.images.len();
        self.images.push(ImageOutcome::Extracted(PageImage {
            image_ref: image_ref(self.page, position),
            position,
            image,
        }));
        self
    }

    /// Append a skipped image at the next position on this page.
    pub fn with_skipped(mut self, reason: impl Into<String>) -> Self {
        let position = self.images.len();
        self.images.push(ImageOutcome::Skipped(SkippedImage {
            page: self.page,
            position,
            reason: reason.into(),
        }));
        self
    }

    /// Whether the page carries any non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A document broken into ordered pages.
#[derive(Debug, Clone, Default)]
pub struct DecomposedDocument {
    pub pages: Vec<PageContent>,
}

impl DecomposedDocument {
    pub fn new(pages: Vec<PageContent>) -> Self {
        Self { pages }
    }

    pub fn extracted_images(&self) -> impl Iterator<Item = (u32, &PageImage)> {
        self.pages.iter().flat_map(|page| {
            page.images.iter().filter_map(move |outcome| match outcome {
                ImageOutcome::Extracted(image) => Some((page.page, image)),
                ImageOutcome::Skipped(_) => None,
            })
        })
    }

    pub fn skipped_images(&self) -> impl Iterator<Item = &SkippedImage> {
        self.pages.iter().flat_map(|page| {
            page.images.iter().filter_map(|outcome| match outcome {
                ImageOutcome::Skipped(skipped) => Some(skipped),
                ImageOutcome::Extracted(_) => None,
            })
        })
    }
}

/// Anything that can be broken into pages of text and images.
pub trait DocumentSource {
    fn decompose(&self) -> Result<DecomposedDocument>;
}

impl DocumentSource for DecomposedDocument {
    fn decompose(&self) -> Result<DecomposedDocument> {
        Ok(self.clone())
    }
}
