//! OCR over an OpenAI-compatible chat-completions endpoint (vLLM).
//!
//! Each page is sent as a single user message holding one base64 PNG
//! data URI; the text comes back in `choices[0].message.content`.
//! Base64 runs on the blocking pool, since a full page is several megabytes.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::config::OcrConfig;
use crate::engine::{EngineError, EngineFuture, OcrEngine};
use crate::pipeline::page::EncodedPage;

/// Longest backend error body kept for logs.
const ERROR_BODY_LOG_LIMIT: usize = 512;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: &'static str,
    image_url: ImageUrl,
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatCompletionsEngine {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsEngine {
    pub fn new(config: &OcrConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn shared(config: &OcrConfig, client: reqwest::Client) -> Arc<dyn OcrEngine> {
        Arc::new(Self::new(config, client))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, png_base64: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![ContentPart {
                    kind: "image_url",
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{png_base64}"),
                    },
                }],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    async fn call(&self, page: &EncodedPage) -> Result<String, EngineError> {
        let png = page.png.clone();
        let png_base64 = tokio::task::spawn_blocking(move || STANDARD.encode(&png))
            .await
            .map_err(|e| EngineError::Encode(e.to_string()))?;
        let body = self.request_body(&png_base64);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(page = page.number, error = %e, "Inference backend connection failed");
                EngineError::Connection(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body: String = text.chars().take(ERROR_BODY_LOG_LIMIT).collect();
            tracing::error!(page = page.number, status = status.as_u16(), body = %body, "Inference backend returned an error");
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        parse_content(&bytes).inspect_err(|e| {
            tracing::error!(page = page.number, error = %e, "Unexpected inference response format");
        })
    }
}

fn parse_content(bytes: &[u8]) -> Result<String, EngineError> {
    let parsed: ChatResponse =
        serde_json::from_slice(bytes).map_err(|e| EngineError::MalformedResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::MalformedResponse("no choices in response".into()))?
        .message
        .content
        .ok_or_else(|| EngineError::MalformedResponse("message has no content".into()))
}

impl OcrEngine for ChatCompletionsEngine {
    fn infer<'a>(&'a self, page: &'a EncodedPage) -> EngineFuture<'a> {
        Box::pin(self.call(page))
    }
}
