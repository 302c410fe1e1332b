//! Sequential execution of stored block functions.
//!
//! The orchestrator loads each named function from a [`FunctionStore`] and
//! threads one [`Context`] through them in order. The context is moved into
//! each call and the returned value becomes the input of the next block.
//! The first failure stops the run; nothing is retried at run time.

#[cfg(test)]
mod integration_tests;
mod state;

pub use state::BlockState;

use crate::cancellation::CancellationToken;
use crate::context::Context;
use crate::errors::{BlockflowError, CancelledError, ExecutionError};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::store::FunctionStore;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened to one block during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockOutcome {
    /// Block name.
    pub name: String,
    /// Final state.
    pub state: BlockState,
    /// Time spent loading and running, in milliseconds.
    pub duration_ms: f64,
    /// Failure message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BlockOutcome {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: BlockState::Pending,
            duration_ms: 0.0,
            error: None,
        }
    }

    fn transition(&mut self, next: BlockState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{} -> {next} is not a valid transition",
            self.state
        );
        self.state = next;
    }
}

/// The execution log of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// One outcome per requested block, in order.
    pub outcomes: Vec<BlockOutcome>,
    /// Wall time of the whole run, in milliseconds.
    pub duration_ms: f64,
    /// Final context, or the error that stopped the run.
    pub result: Result<Context, BlockflowError>,
}

impl RunReport {
    /// True when every block executed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The final context, when the run succeeded.
    #[must_use]
    pub fn context(&self) -> Option<&Context> {
        self.result.as_ref().ok()
    }

    /// Names of blocks that executed, in order.
    #[must_use]
    pub fn completed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == BlockState::Executed)
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Consumes the report and returns the run result.
    pub fn into_result(self) -> Result<Context, BlockflowError> {
        self.result
    }

    /// JSON summary: run id, outcomes, and either the context or the error.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "run_id": self.run_id.to_string(),
            "success": self.is_success(),
            "duration_ms": self.duration_ms,
            "blocks": self.outcomes,
        });
        match &self.result {
            Ok(ctx) => value["context"] = ctx.to_value(),
            Err(e) => value["error"] = json!(e.to_dict()),
        }
        value
    }
}

/// Runs stored block functions in order against a shared context.
pub struct Orchestrator {
    store: Arc<dyn FunctionStore>,
    event_sink: Arc<dyn EventSink>,
    cancellation: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over `store`.
    pub fn new(store: Arc<dyn FunctionStore>) -> Self {
        Self {
            store,
            event_sink: Arc::new(NoOpEventSink),
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Uses `token` for cancellation instead of a private one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The token that cancels this orchestrator's runs.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Runs `names` in order from an empty context.
    pub async fn run_pipeline<S: AsRef<str>>(&self, names: &[S]) -> Result<Context, BlockflowError> {
        self.run_pipeline_with_report(names).await.into_result()
    }

    /// Runs `names` in order from an empty context and returns the full log.
    pub async fn run_pipeline_with_report<S: AsRef<str>>(&self, names: &[S]) -> RunReport {
        let run_id = Uuid::now_v7();
        let start = Instant::now();
        let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
        let mut outcomes: Vec<BlockOutcome> =
            names.iter().map(|n| BlockOutcome::pending(n)).collect();

        info!(run_id = %run_id, blocks = names.len(), "pipeline started");
        self.event_sink.try_emit(
            events::PIPELINE_STARTED,
            Some(json!({"run_id": run_id.to_string(), "blocks": names})),
        );

        let result = self.execute(&names, &mut outcomes).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(ctx) => {
                info!(run_id = %run_id, duration_ms, keys = ctx.len(), "pipeline completed");
                self.event_sink.try_emit(
                    events::PIPELINE_COMPLETED,
                    Some(json!({"run_id": run_id.to_string(), "duration_ms": duration_ms})),
                );
            }
            Err(BlockflowError::Cancelled(e)) => {
                warn!(run_id = %run_id, reason = %e.reason, "pipeline cancelled");
                self.event_sink.try_emit(
                    events::PIPELINE_CANCELLED,
                    Some(json!({
                        "run_id": run_id.to_string(),
                        "reason": e.reason,
                        "block": e.next_block,
                        "last_completed": e.last_completed,
                    })),
                );
            }
            Err(e) => {
                error!(run_id = %run_id, block = e.block_name().unwrap_or("-"), error = %e, "pipeline failed");
                self.event_sink.try_emit(
                    events::PIPELINE_FAILED,
                    Some(json!({
                        "run_id": run_id.to_string(),
                        "block": e.block_name(),
                        "error": e.to_string(),
                    })),
                );
            }
        }

        RunReport {
            run_id,
            outcomes,
            duration_ms,
            result,
        }
    }

    async fn execute(
        &self,
        names: &[&str],
        outcomes: &mut [BlockOutcome],
    ) -> Result<Context, BlockflowError> {
        let mut context = Context::new();
        let mut completed: Vec<String> = Vec::with_capacity(names.len());

        for (index, &name) in names.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                for outcome in &mut outcomes[index..] {
                    outcome.transition(BlockState::Cancelled);
                }
                let reason = self
                    .cancellation
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string());
                return Err(CancelledError::new(reason, context)
                    .before_block(name)
                    .after_block(completed.last().cloned())
                    .into());
            }

            let outcome = &mut outcomes[index];
            let block_start = Instant::now();

            let function = match self.store.load(name).await {
                Ok(function) => function,
                Err(e) => {
                    outcome.transition(BlockState::LoadFailed);
                    outcome.duration_ms = block_start.elapsed().as_secs_f64() * 1000.0;
                    outcome.error = Some(e.to_string());
                    self.event_sink.try_emit(
                        events::BLOCK_FAILED,
                        Some(json!({"block": name, "state": outcome.state, "error": e.to_string()})),
                    );
                    return Err(e);
                }
            };
            outcome.transition(BlockState::Loaded);
            self.event_sink
                .try_emit(events::BLOCK_LOADED, Some(json!({"block": name})));
            debug!(block = %name, "running block");

            // Kept so a failure can report the context as of the last completed block.
            let checkpoint = context.clone();
            match function.call(context).await {
                Ok(next) => {
                    context = next;
                    outcome.transition(BlockState::Executed);
                    outcome.duration_ms = block_start.elapsed().as_secs_f64() * 1000.0;
                    info!(block = %name, duration_ms = outcome.duration_ms, "block executed");
                    self.event_sink.try_emit(
                        events::BLOCK_COMPLETED,
                        Some(json!({"block": name, "duration_ms": outcome.duration_ms})),
                    );
                    completed.push(name.to_string());
                }
                Err(cause) => {
                    outcome.transition(BlockState::ExecFailed);
                    outcome.duration_ms = block_start.elapsed().as_secs_f64() * 1000.0;
                    outcome.error = Some(cause.to_string());
                    self.event_sink.try_emit(
                        events::BLOCK_FAILED,
                        Some(json!({
                            "block": name,
                            "state": outcome.state,
                            "error_type": cause.error_type,
                            "error": cause.message,
                        })),
                    );
                    return Err(ExecutionError::new(name, cause, checkpoint)
                        .with_completed(completed)
                        .into());
                }
            }
        }

        Ok(context)
    }
}
