//! PDF decomposition using lopdf.

use std::collections::HashSet;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::{
    image_ref, DecomposedDocument, DocumentError, DocumentSource, ImageOutcome, PageContent,
    PageImage, Result, SkippedImage,
};

/// Images above this many pixels are skipped rather than decoded.
const MAX_IMAGE_PIXELS: u64 = 40_000_000;

/// A PDF held in memory. Each call to `decompose` parses it afresh.
pub struct PdfDocument {
    bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }
}

impl DocumentSource for PdfDocument {
    fn decompose(&self) -> Result<DecomposedDocument> {
        // The parsed document is dropped on every exit path from this function.
        let doc =
            Document::load_mem(&self.bytes).map_err(|e| DocumentError::Pdf(e.to_string()))?;

        let mut pages = Vec::new();
        for (index, (page_number, page_id)) in doc.get_pages().into_iter().enumerate() {
            let page = index as u32;

            let text = match doc.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Could not extract text from page {}: {}", page, e);
                    String::new()
                }
            };

            let images = extract_page_images(&doc, page, page_id);
            pages.push(PageContent { page, text, images });
        }

        log::debug!("Decomposed PDF into {} pages", pages.len());
        Ok(DecomposedDocument::new(pages))
    }
}

/// Collect image XObjects from a page's resources, in resource order.
fn extract_page_images(doc: &Document, page: u32, page_id: ObjectId) -> Vec<ImageOutcome> {
    let (resources_opt, resource_ids) = match doc.get_page_resources(page_id) {
        Ok(resources) => resources,
        Err(e) => {
            log::warn!("Could not read resources of page {}: {}", page, e);
            return Vec::new();
        }
    };

    let mut resource_dicts: Vec<&Dictionary> = Vec::new();
    if let Some(dict) = resources_opt {
        resource_dicts.push(dict);
    }
    let mut seen_resources = HashSet::new();
    for res_id in resource_ids {
        if seen_resources.insert(res_id) {
            if let Ok(dict) = doc.get_dictionary(res_id) {
                resource_dicts.push(dict);
            }
        }
    }

    let mut outcomes = Vec::new();
    let mut seen_images = HashSet::new();

    for dict in resource_dicts {
        let xobj_dict = match dict.get(b"XObject") {
            Ok(Object::Dictionary(d)) => Some(d),
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
            _ => None,
        };
        let Some(xobj_dict) = xobj_dict else {
            continue;
        };

        for (_, obj) in xobj_dict.iter() {
            let Object::Reference(id) = obj else {
                continue;
            };
            let Ok(stream) = doc.get_object(*id).and_then(Object::as_stream) else {
                continue;
            };
            let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image");
            if !is_image || !seen_images.insert(*id) {
                continue;
            }

            let position = outcomes.len();
            match decode_image_stream(stream) {
                Ok(image) => outcomes.push(ImageOutcome::Extracted(PageImage {
                    image_ref: image_ref(page, position),
                    position,
                    image,
                })),
                Err(reason) => {
                    log::warn!(
                        "Could not process image {} on page {}: {}",
                        position,
                        page,
                        reason
                    );
                    outcomes.push(ImageOutcome::Skipped(SkippedImage {
                        page,
                        position,
                        reason,
                    }));
                }
            }
        }
    }

    outcomes
}

fn decode_image_stream(stream: &Stream) -> std::result::Result<DynamicImage, String> {
    let dimension = |key: &[u8]| -> std::result::Result<u32, String> {
        let value = stream
            .dict
            .get(key)
            .and_then(Object::as_i64)
            .map_err(|_| format!("missing {}", String::from_utf8_lossy(key)))?;
        u32::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("invalid {} {}", String::from_utf8_lossy(key), value))
    };
    let width = dimension(b"Width")?;
    let height = dimension(b"Height")?;
    let pixels = width as u64 * height as u64;
    if pixels > MAX_IMAGE_PIXELS {
        return Err(format!("image too large ({}x{})", width, height));
    }

    let filters: Vec<Vec<u8>> = match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    };

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    // Encoded formats go straight to the image crate
    if filters
        .iter()
        .any(|f| f == b"DCTDecode" || f == b"JPXDecode")
    {
        return image::load_from_memory(&data).map_err(|e| e.to_string());
    }

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return Err(format!("unsupported bits per component: {}", bits));
    }

    let channels = match stream.dict.get(b"ColorSpace").and_then(Object::as_name) {
        Ok(b"DeviceGray") => 1,
        Ok(b"DeviceRGB") => 3,
        Ok(b"DeviceCMYK") => 4,
        // Indexed/ICC-based spaces: infer from the sample count
        _ => match data.len() as u64 / pixels {
            n @ (1 | 3 | 4) => n as usize,
            _ => return Err("unsupported color space".to_string()),
        },
    };

    let expected = pixels as usize * channels;
    if data.len() < expected {
        return Err(format!(
            "truncated image data: expected {} bytes, got {}",
            expected,
            data.len()
        ));
    }
    let samples = &data[..expected];

    let image = match channels {
        1 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, samples.to_vec())
            .map(DynamicImage::ImageLuma8),
        3 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, samples.to_vec())
            .map(DynamicImage::ImageRgb8),
        _ => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, cmyk_to_rgb(samples))
            .map(DynamicImage::ImageRgb8),
    };
    image.ok_or_else(|| "image buffer size mismatch".to_string())
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u16;
            [
                ((255 - px[0] as u16) * k / 255) as u8,
                ((255 - px[1] as u16) * k / 255) as u8,
                ((255 - px[2] as u16) * k / 255) as u8,
            ]
        })
        .collect()
}
