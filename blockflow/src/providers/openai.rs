//! OpenAI-compatible HTTP client.

use super::{GenerationRequest, GenerationResponse, GenerationService};
use crate::config::{ApiMode, GenerationSettings};
use crate::errors::GenerationError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

const ERROR_BODY_PREVIEW_CHARS: usize = 500;

/// Talks to `chat/completions` or the legacy `completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiService {
    client: reqwest::Client,
    settings: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl OpenAiService {
    /// Creates a client from generation settings.
    pub fn new(settings: GenerationSettings) -> Result<Self, GenerationError> {
        let timeout = settings
            .timeout()
            .map_err(|e| GenerationError::service("-", e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::service("-", format!("http client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        let base = self.settings.api_base.trim_end_matches('/');
        match self.settings.api_mode {
            ApiMode::Chat => format!("{base}/chat/completions"),
            ApiMode::Completion => format!("{base}/completions"),
        }
    }

    fn headers(&self, block: &str) -> Result<HeaderMap, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.settings.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| GenerationError::service(block, format!("invalid api key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn body(&self, request: &GenerationRequest) -> Result<serde_json::Value, serde_json::Error> {
        let model = self.settings.model.as_str();
        let temperature = request.temperature.unwrap_or(self.settings.temperature);
        let max_tokens = request.max_tokens.unwrap_or(self.settings.max_tokens);
        match self.settings.api_mode {
            ApiMode::Chat => serde_json::to_value(ChatRequest {
                model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &request.prompt,
                }],
                temperature,
                max_tokens,
            }),
            ApiMode::Completion => serde_json::to_value(CompletionRequest {
                model,
                prompt: &request.prompt,
                temperature,
                max_tokens,
                n: 1,
            }),
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiService {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let block = request.block_name.as_str();
        let body = self
            .body(&request)
            .map_err(|e| GenerationError::service(block, format!("encode request: {e}")))?;

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .headers(self.headers(block)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::timeout(block, self.settings.timeout_seconds)
                } else {
                    GenerationError::service(block, e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::service(block, e.to_string()))?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if !status.is_success() {
            warn!(block = %block, status = %status, "generation service returned an error");
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            return Ok(GenerationResponse::failed(format!("HTTP {status}: {preview}"))
                .with_latency_ms(latency_ms));
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::service(block, format!("decode response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.and_then(|m| m.content).or(c.text))
            .unwrap_or_default();

        debug!(
            block = %block,
            latency_ms,
            chars = content.len(),
            "generation service responded"
        );

        let mut out = GenerationResponse::ok(content.trim())
            .with_model(parsed.model.unwrap_or_else(|| self.settings.model.clone()))
            .with_latency_ms(latency_ms);
        if let Some(tokens) = parsed.usage.and_then(|u| u.total_tokens) {
            out = out.with_tokens(tokens);
        }
        Ok(out)
    }
}
