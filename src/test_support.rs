//! Deterministic doubles for the embedding and completion services, plus fixture builders.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use image::{DynamicImage, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::completion::{self, CompletionError, CompletionModel, Prompt};
use crate::embedding::{self, Embedder, Embedding, EmbeddingError};

/// Named axes of the concept space. The last axis is a constant bias so that any
/// input, including empty text, maps to a nonzero vector.
const CONCEPTS: [&str; 7] = ["bicycle", "red", "tax", "report", "quarterly", "chart", "blue"];
const BIAS: f32 = 0.1;

pub const RED: [u8; 3] = [220, 20, 30];
pub const BLUE: [u8; 3] = [20, 40, 210];

pub fn red_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(RED)))
}

pub fn blue_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(BLUE)))
}

/// PNG bytes of `image`.
pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

/// Embeds text by which concept words it mentions and images by dominant colour:
/// red pictures land on "red bicycle", blue pictures on "blue chart".
pub struct ConceptEmbedder {
    ready: AtomicBool,
    reject_images: bool,
}

impl ConceptEmbedder {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            reject_images: false,
        }
    }

    pub fn ready() -> Self {
        let embedder = Self::new();
        embedder.ready.store(true, Ordering::SeqCst);
        embedder
    }

    /// Ready embedder that reports every image as invalid.
    pub fn rejecting_images() -> Self {
        let mut embedder = Self::ready();
        embedder.reject_images = true;
        embedder
    }

    fn axis(concept: &str) -> usize {
        CONCEPTS.iter().position(|c| *c == concept).unwrap_or(CONCEPTS.len())
    }

    fn check_ready(&self) -> embedding::Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(EmbeddingError::NotInitialized)
        }
    }
}

impl Embedder for ConceptEmbedder {
    fn model_id(&self) -> &str {
        "concept-test"
    }

    fn initialize(&self) -> embedding::Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len() + 1
    }

    fn embed_text(&self, text: &str) -> embedding::Result<Embedding> {
        self.check_ready()?;
        let lower = text.to_lowercase();
        let mut values = vec![0.0; self.dimension()];
        for (axis, concept) in CONCEPTS.iter().enumerate() {
            if lower.contains(concept) {
                values[axis] = 1.0;
            }
        }
        values[CONCEPTS.len()] = BIAS;
        Embedding::from_raw(values)
    }

    fn embed_image(&self, image: &DynamicImage) -> embedding::Result<Embedding> {
        self.check_ready()?;
        if self.reject_images {
            return Err(EmbeddingError::InvalidImage("rejected by test embedder".into()));
        }

        let rgb = image.to_rgb8();
        let pixels = (rgb.width() as u64 * rgb.height() as u64).max(1);
        let mut sums = [0u64; 3];
        for px in rgb.pixels() {
            for (sum, channel) in sums.iter_mut().zip(px.0) {
                *sum += channel as u64;
            }
        }
        let [r, g, b] = sums.map(|s| s / pixels);

        let mut values = vec![0.0; self.dimension()];
        if r > g + b {
            values[Self::axis("bicycle")] = 1.0;
            values[Self::axis("red")] = 1.0;
        } else if b > r + g {
            values[Self::axis("chart")] = 1.0;
            values[Self::axis("blue")] = 1.0;
        }
        values[CONCEPTS.len()] = BIAS;
        Embedding::from_raw(values)
    }
}

/// Completion model that records every prompt it receives.
pub struct RecordingCompletion {
    answer: String,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl RecordingCompletion {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl CompletionModel for RecordingCompletion {
    fn model_id(&self) -> &str {
        "recording-test"
    }

    fn complete(&self, prompt: &Prompt) -> completion::Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.answer.clone())
    }
}

/// Completion model whose service is always down.
pub struct FailingCompletion;

impl CompletionModel for FailingCompletion {
    fn model_id(&self) -> &str {
        "failing-test"
    }

    fn complete(&self, _prompt: &Prompt) -> completion::Result<String> {
        Err(CompletionError::Service {
            status: 503,
            message: "unavailable".to_string(),
        })
    }
}

/// Image XObject placed on a generated PDF page.
pub enum TestImage {
    /// Uncompressed 8-bit DeviceRGB samples
    Raw {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    /// A DCTDecode stream whose bytes are not a JPEG
    CorruptJpeg,
}

impl TestImage {
    pub fn red_square() -> Self {
        Self::Raw {
            width: 2,
            height: 2,
            pixels: RED.repeat(4),
        }
    }

    fn into_stream(self) -> Stream {
        match self {
            Self::Raw {
                width,
                height,
                pixels,
            } => Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                pixels,
            ),
            Self::CorruptJpeg => Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => 2,
                    "Height" => 2,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                b"\xFF\xD8 this is not jpeg data".to_vec(),
            ),
        }
    }
}

pub struct TestPage {
    pub text: Option<String>,
    pub images: Vec<TestImage>,
}

/// Serialize a PDF with one page per entry.
pub fn build_pdf(pages: Vec<TestPage>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut operations = Vec::new();
        if let Some(text) = &page.text {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                Operation::new("ET", vec![]),
            ]);
        }

        let mut xobjects = Dictionary::new();
        for (i, image) in page.images.into_iter().enumerate() {
            let name = format!("Im{}", i);
            let image_id = doc.add_object(image.into_stream());
            xobjects.set(name.clone(), image_id);
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        100.into(),
                        0.into(),
                        0.into(),
                        100.into(),
                        50.into(),
                        (500 - 110 * i as i64).into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// One request as received by [`MockServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request line and headers
    pub head: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

/// HTTP server on a loopback port answering each connection with the next
/// scripted `(status, json body)` pair, then closing it.
pub struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                if let Some(request) = read_request(&mut stream) {
                    recorded.lock().unwrap().push(request);
                }
                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { url, requests }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buffer.len() < head_end + content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let body_end = buffer.len().min(head_end + content_length);
    Some(RecordedRequest {
        head: head.trim_end().to_string(),
        body: String::from_utf8_lossy(&buffer[head_end..body_end]).into_owned(),
    })
}

/// Embedding service response carrying one vector.
pub fn embedding_body(values: &[f32]) -> String {
    serde_json::json!({ "data": [{ "embedding": values, "index": 0 }] }).to_string()
}

/// Chat completions response carrying one answer.
pub fn chat_body(answer: &str) -> String {
    serde_json::json!({ "choices": [{ "message": { "content": answer } }] }).to_string()
}
