//! Blocking client for multimodal (CLIP-style) embedding services.
//!
//! Speaks the `/embeddings` shape used by multimodal providers: each input is either
//! `{"text": ...}` or `{"image": "<base64 png>"}`, and the response carries one
//! `data[i].embedding` per input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::DynamicImage;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{truncate_chars, Embedder, Embedding, EmbeddingError, Result};
use crate::config::EmbeddingSettings;
use crate::rag::ImageBlob;

const PROBE_TEXT: &str = "initialization probe";

/// Statuses with which a service refuses the submitted image itself.
const REJECTED_INPUT_STATUSES: [StatusCode; 4] = [
    StatusCode::BAD_REQUEST,
    StatusCode::PAYLOAD_TOO_LARGE,
    StatusCode::UNSUPPORTED_MEDIA_TYPE,
    StatusCode::UNPROCESSABLE_ENTITY,
];

/// Embedder backed by a remote multimodal embedding endpoint.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_input_chars: usize,
    ready: AtomicBool,
}

impl HttpEmbedder {
    /// Build a client from configuration. Does not contact the service.
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(EmbeddingError::ModelUnavailable(
                "missing embedding model name".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth).map_err(|_| {
                EmbeddingError::ModelUnavailable("invalid embedding API key".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", settings.endpoint.trim_end_matches('/')),
            model: settings.model.clone(),
            dimension: settings.dimension,
            max_input_chars: settings.max_input_chars,
            ready: AtomicBool::new(false),
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(EmbeddingError::NotInitialized)
        }
    }

    fn request(&self, input: EmbeddingInput<'_>) -> Result<Embedding> {
        let is_image = matches!(input, EmbeddingInput::Image { .. });
        let body = EmbeddingRequest {
            model: &self.model,
            input: vec![input],
        };

        let response = self.client.post(&self.endpoint).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(failure(status, message, is_image));
        }

        let parsed: EmbeddingResponse = response.json()?;
        parse_single(parsed, self.dimension)
    }
}

/// Map an unsuccessful response to an error. Only a rejected image is a
/// per-item failure; auth, rate limiting, routing and server errors stop the run.
fn failure(status: StatusCode, message: String, is_image: bool) -> EmbeddingError {
    if is_image && REJECTED_INPUT_STATUSES.contains(&status) {
        return EmbeddingError::InvalidImage(format!("{}: {}", status, message));
    }
    EmbeddingError::Service {
        status: status.as_u16(),
        message,
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn initialize(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        log::info!("Probing embedding model '{}' at {}", self.model, self.endpoint);
        self.request(EmbeddingInput::Text { text: PROBE_TEXT })
            .map_err(|e| EmbeddingError::ModelUnavailable(e.to_string()))?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Result<Embedding> {
        self.ensure_ready()?;
        let text = truncate_chars(text, self.max_input_chars);
        self.request(EmbeddingInput::Text { text })
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Embedding> {
        self.ensure_ready()?;
        let blob =
            ImageBlob::from_image(image).map_err(|e| EmbeddingError::InvalidImage(e.to_string()))?;
        self.request(EmbeddingInput::Image { image: &blob.data })
    }
}

fn parse_single(mut response: EmbeddingResponse, dimension: usize) -> Result<Embedding> {
    response.data.sort_by_key(|entry| entry.index);
    let entry = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::MalformedResponse("no embeddings returned".to_string()))?;

    if entry.embedding.len() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: entry.embedding.len(),
        });
    }
    Embedding::from_raw(entry.embedding)
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<EmbeddingInput<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Text { text: &'a str },
    Image { image: &'a str },
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
