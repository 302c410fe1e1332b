//! The code generator: prompt, call, extract, validate, retry.

use super::{extract_code, request_for, FunctionOrigin, GeneratedFunction};
use crate::blocks::BlockDefinition;
use crate::config::{GenerationSettings, RetryPolicy, Settings};
use crate::errors::{BlockflowError, GenerationError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::providers::GenerationService;
use crate::store::{FunctionStore, StoreLocation};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// One block that made it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltBlock {
    /// Block name.
    pub name: String,
    /// Generated or stub.
    pub origin: FunctionOrigin,
    /// Generation attempts used.
    pub attempts: usize,
    /// SHA-256 of the saved source.
    pub digest: String,
    /// Where the function was saved.
    pub location: StoreLocation,
}

/// Outcome of generating and saving a set of blocks.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Saved blocks, in block order.
    pub built: Vec<BuiltBlock>,
    /// Blocks whose generation failed, in block order. None of them were saved.
    pub failed: Vec<GenerationError>,
}

impl BuildReport {
    /// True when every block was saved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of saved stubs.
    #[must_use]
    pub fn stub_count(&self) -> usize {
        self.built
            .iter()
            .filter(|b| b.origin == FunctionOrigin::Stub)
            .count()
    }

    /// The first failure in block order.
    #[must_use]
    pub fn first_failure(&self) -> Option<&GenerationError> {
        self.failed.first()
    }

    /// JSON summary for reports.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let failed: Vec<_> = self.failed.iter().map(GenerationError::to_dict).collect();
        json!({
            "built": self.built,
            "failed": failed,
        })
    }
}

/// Generates validated functions for blocks through a generation service.
pub struct CodeGenerator {
    service: Arc<dyn GenerationService>,
    settings: GenerationSettings,
    retry: RetryPolicy,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for CodeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeGenerator")
            .field("model", &self.settings.model)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CodeGenerator {
    /// Creates a generator with default settings.
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self {
            service,
            settings: GenerationSettings::default(),
            retry: RetryPolicy::default(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a generator from loaded settings.
    pub fn from_settings(service: Arc<dyn GenerationService>, settings: &Settings) -> Self {
        Self::new(service)
            .with_generation_settings(settings.generation.clone())
            .with_retry_policy(settings.retry.clone())
    }

    /// Replaces the generation settings.
    #[must_use]
    pub fn with_generation_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables stub substitution after exhausted retries.
    #[must_use]
    pub fn with_stub_on_failure(mut self, enabled: bool) -> Self {
        self.settings.stub_on_failure = enabled;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The retry policy in effect.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Makes one generation attempt for `block`.
    pub async fn generate(
        &self,
        block: &BlockDefinition,
    ) -> Result<GeneratedFunction, GenerationError> {
        let name = block.name();
        let request = request_for(block)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        let limit = self
            .settings
            .timeout()
            .map_err(|e| GenerationError::service(name, e.to_string()))?;

        let start = Instant::now();
        let response = match timeout(limit, self.service.generate(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GenerationError::timeout(name, self.settings.timeout_seconds));
            }
        };

        if !response.success {
            return Err(GenerationError::service(
                name,
                response
                    .error
                    .unwrap_or_else(|| "generation service reported failure".to_string()),
            ));
        }

        let code = extract_code(&response.text, name);
        if code.is_empty() {
            return Err(GenerationError::empty_output(name));
        }

        debug!(
            block = %name,
            model = response.model.as_deref().unwrap_or(&self.settings.model),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            tokens = response.tokens,
            "received candidate source"
        );

        GeneratedFunction::validated(name, &code)
            .map_err(|e| GenerationError::invalid_payload(name, e.to_string()))
    }

    /// Generates `block`, retrying per the policy.
    ///
    /// When every attempt fails and stubs are enabled, returns a stub instead
    /// of the last error.
    pub async fn generate_with_retry(
        &self,
        block: &BlockDefinition,
    ) -> Result<GeneratedFunction, GenerationError> {
        self.generate_counted(block).await.map(|(function, _)| function)
    }

    async fn generate_counted(
        &self,
        block: &BlockDefinition,
    ) -> Result<(GeneratedFunction, usize), GenerationError> {
        let name = block.name();
        let limit = self.retry.attempt_limit();
        self.event_sink.try_emit(
            events::GENERATION_STARTED,
            Some(json!({"block": name, "max_attempts": limit})),
        );

        let mut last_error = None;
        for attempt in 1..=limit {
            match self.generate(block).await {
                Ok(function) => {
                    info!(block = %name, attempt, digest = %function.digest(), "generated function");
                    self.event_sink.try_emit(
                        events::GENERATION_COMPLETED,
                        Some(json!({
                            "block": name,
                            "attempts": attempt,
                            "origin": function.origin(),
                        })),
                    );
                    return Ok((function, attempt));
                }
                Err(e) => {
                    warn!(
                        block = %name,
                        attempt,
                        max_attempts = limit,
                        failure = e.failure.as_str(),
                        error = %e.message,
                        "generation attempt failed"
                    );
                    self.event_sink.try_emit(
                        events::GENERATION_ATTEMPT_FAILED,
                        Some(json!({
                            "block": name,
                            "attempt": attempt,
                            "failure": e.failure.as_str(),
                            "reason": e.message,
                        })),
                    );
                    last_error = Some(e);
                    if attempt < limit {
                        sleep(self.retry.delay_for(attempt - 1)).await;
                    }
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| GenerationError::service(name, "no attempt was made"))
            .with_attempts(limit);

        if self.settings.stub_on_failure {
            warn!(block = %name, error = %err, "substituting stub function");
            self.event_sink.try_emit(
                events::GENERATION_STUBBED,
                Some(json!({"block": name, "attempts": limit, "reason": err.message})),
            );
            return Ok((GeneratedFunction::stub(name, block.description()), limit));
        }

        error!(block = %name, error = %err, "generation failed");
        self.event_sink
            .try_emit(events::GENERATION_FAILED, Some(json!(err.to_dict())));
        Err(err)
    }

    /// Generates every block and saves the results to `store`.
    ///
    /// Up to `max_concurrency` blocks are generated at once; results are
    /// saved in block order. Generation failures are collected in the report;
    /// only store failures abort the build.
    pub async fn build(
        &self,
        blocks: &[BlockDefinition],
        store: &dyn FunctionStore,
    ) -> Result<BuildReport, BlockflowError> {
        let concurrency = self.settings.max_concurrency.max(1);
        info!(blocks = blocks.len(), concurrency, "generating functions");

        let results: Vec<_> = stream::iter(blocks)
            .map(|block| self.generate_counted(block))
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = BuildReport::default();
        for result in results {
            match result {
                Ok((function, attempts)) => {
                    let location = store.save(&function).await?;
                    let digest = function.digest();
                    info!(
                        block = %function.name(),
                        origin = %function.origin(),
                        location = %location,
                        "saved function"
                    );
                    self.event_sink.try_emit(
                        events::FUNCTION_SAVED,
                        Some(json!({
                            "block": function.name(),
                            "origin": function.origin(),
                            "location": location.to_string(),
                            "digest": digest,
                        })),
                    );
                    report.built.push(BuiltBlock {
                        name: function.name().to_string(),
                        origin: function.origin(),
                        attempts,
                        digest,
                        location,
                    });
                }
                Err(e) => report.failed.push(e),
            }
        }
        Ok(report)
    }
}
