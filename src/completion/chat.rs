use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{CompletionError, CompletionModel, Prompt, PromptSegment, Result};
use crate::config::CompletionSettings;

/// Client for OpenAI-compatible `/chat/completions` endpoints with vision input.
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: usize,
}

impl ChatCompletionClient {
    pub fn new(settings: &CompletionSettings) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(CompletionError::Configuration(
                "missing completion model name".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            let auth = format!("Bearer {}", key.trim());
            let value = HeaderValue::from_str(&auth).map_err(|_| {
                CompletionError::Configuration("invalid completion API key".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                settings.endpoint.trim_end_matches('/')
            ),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }
}

impl CompletionModel for ChatCompletionClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = build_request(&self.model, self.max_tokens, prompt);
        log::debug!(
            "Requesting completion from {} ({} segments, {} images)",
            self.model,
            prompt.segments.len(),
            prompt.image_count()
        );

        let resp = self.client.post(&self.endpoint).json(&body).send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CompletionError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = resp.json()?;
        extract_answer(parsed)
    }
}

fn build_request<'a>(model: &'a str, max_tokens: usize, prompt: &'a Prompt) -> ChatRequest<'a> {
    let content = prompt
        .segments
        .iter()
        .map(|segment| match segment {
            PromptSegment::Text { text } => ContentPart::Text { text },
            PromptSegment::Image { mime, data } => ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", mime, data),
                },
            },
        })
        .collect();

    ChatRequest {
        model,
        max_tokens,
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
    }
}

fn extract_answer(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .ok_or(CompletionError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
