//! Code-generation services.
//!
//! A [`GenerationService`] takes a prompt and answers with text. The code
//! generator owns everything else (extraction, validation, retries), so any
//! "send prompt, receive text" backend can sit behind this trait.

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAiService;

use crate::errors::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A request for source code for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The block the code is for.
    pub block_name: String,
    /// Full prompt text.
    pub prompt: String,
    /// Sampling temperature override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion length override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Creates a request with service defaults for sampling.
    #[must_use]
    pub fn new(block_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            block_name: block_name.into(),
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the completion length limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// What a generation service answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Raw completion text.
    pub text: String,
    /// Whether the service considers the call successful.
    pub success: bool,
    /// Service-reported error when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Model that produced the reply, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Round-trip time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// Total tokens used, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
}

impl GenerationResponse {
    /// A successful response carrying `text`.
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
            error: None,
            model: None,
            latency_ms: None,
            tokens: None,
        }
    }

    /// A response the service itself marked as failed.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            success: false,
            error: Some(error.into()),
            model: None,
            latency_ms: None,
            tokens: None,
        }
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the latency.
    #[must_use]
    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Sets the token count.
    #[must_use]
    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Converts to span-style attributes for logging.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("generation.success".to_string(), serde_json::json!(self.success));
        if let Some(ref m) = self.model {
            map.insert("generation.model".to_string(), serde_json::json!(m));
        }
        if let Some(l) = self.latency_ms {
            map.insert("generation.latency_ms".to_string(), serde_json::json!(l));
        }
        if let Some(t) = self.tokens {
            map.insert("generation.tokens".to_string(), serde_json::json!(t));
        }
        map
    }
}

/// Turns prompts into candidate source text.
///
/// Transport failures are returned as `Err`; a service that answers but
/// reports failure returns `Ok` with `success == false`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends one request.
    async fn generate(&self, request: GenerationRequest)
        -> Result<GenerationResponse, GenerationError>;
}

#[async_trait]
impl<T: GenerationService + ?Sized> GenerationService for Arc<T> {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        (**self).generate(request).await
    }
}
