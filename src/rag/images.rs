//! Image blob store: `image_ref` → encoded raster payload.

use std::collections::HashMap;
use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

pub const PNG_MIME: &str = "image/png";

/// An encoded image payload, base64 text plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBlob {
    pub mime: String,
    pub data: String,
}

impl ImageBlob {
    /// Convert to RGB and encode as base64 PNG.
    pub fn from_image(image: &DynamicImage) -> Result<Self, image::ImageError> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut buffer = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(Self {
            mime: PNG_MIME.to_string(),
            data: BASE64.encode(&buffer),
        })
    }

    /// `data:` URL form accepted by vision-capable chat APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }

    /// Decode the payload back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }
}

/// In-memory view of the blobs belonging to one collection.
///
/// Only [`KnowledgeBase`](super::KnowledgeBase) mutates this, and always together with
/// the vector index.
#[derive(Debug, Clone, Default)]
pub struct ImageBlobStore {
    blobs: HashMap<String, ImageBlob>,
}

impl ImageBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image_ref: &str) -> Option<&ImageBlob> {
        self.blobs.get(image_ref)
    }

    pub fn contains(&self, image_ref: &str) -> bool {
        self.blobs.contains_key(image_ref)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImageBlob)> {
        self.blobs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, image_ref: String, blob: ImageBlob) {
        self.blobs.insert(image_ref, blob);
    }

    pub(crate) fn clear(&mut self) {
        self.blobs.clear();
    }
}

impl FromIterator<(String, ImageBlob)> for ImageBlobStore {
    fn from_iter<I: IntoIterator<Item = (String, ImageBlob)>>(iter: I) -> Self {
        Self {
            blobs: iter.into_iter().collect(),
        }
    }
}
