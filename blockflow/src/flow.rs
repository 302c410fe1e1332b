//! Parse, generate, store and run in one call.

use crate::blocks::{parse_blocks, BlockDefinition};
use crate::cancellation::CancellationToken;
use crate::codegen::{BuildReport, CodeGenerator};
use crate::config::Settings;
use crate::context::Context;
use crate::errors::BlockflowError;
use crate::events::EventSink;
use crate::functions::PythonInterpreter;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::providers::GenerationService;
use crate::store::{FileFunctionStore, FunctionStore};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Everything a flow run produced.
#[derive(Debug)]
pub struct FlowReport {
    /// Parsed blocks, in order.
    pub blocks: Vec<BlockDefinition>,
    /// Generation results; `None` when generation was skipped.
    pub build: Option<BuildReport>,
    /// The pipeline run.
    pub run: RunReport,
}

impl FlowReport {
    /// True when the run completed every block.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.run.is_success()
    }

    /// JSON summary of blocks, build and run.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "blocks": self.blocks.iter().map(|b| json!({
                "name": b.name(),
                "title": b.title(),
            })).collect::<Vec<_>>(),
            "build": self.build.as_ref().map(BuildReport::to_json),
            "run": self.run.to_json(),
        })
    }
}

/// Composes the parser, generator, store and orchestrator.
pub struct Flow {
    generator: CodeGenerator,
    store: Arc<dyn FunctionStore>,
    orchestrator: Orchestrator,
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("generator", &self.generator)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl Flow {
    /// Creates a flow that saves to and runs from `store`.
    pub fn new(generator: CodeGenerator, store: Arc<dyn FunctionStore>) -> Self {
        let orchestrator = Orchestrator::new(store.clone());
        Self {
            generator,
            store,
            orchestrator,
        }
    }

    /// Builds a flow from settings: a file store under `output_dir` running
    /// functions with the configured interpreter.
    ///
    /// # Errors
    ///
    /// Returns a config error when the interpreter timeout is unusable.
    pub fn from_settings(
        settings: &Settings,
        service: Arc<dyn GenerationService>,
    ) -> Result<Self, BlockflowError> {
        let interpreter = Arc::new(PythonInterpreter::from_settings(&settings.interpreter)?);
        let store: Arc<dyn FunctionStore> = Arc::new(FileFunctionStore::with_interpreter(
            &settings.output_dir,
            interpreter,
        ));
        Ok(Self::new(
            CodeGenerator::from_settings(service, settings),
            store,
        ))
    }

    /// Sends generator and orchestrator events to `sink`.
    #[must_use]
    pub fn with_event_sink(self, sink: Arc<dyn EventSink>) -> Self {
        Self {
            generator: self.generator.with_event_sink(sink.clone()),
            orchestrator: self.orchestrator.with_event_sink(sink),
            store: self.store,
        }
    }

    /// Cancels runs when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.orchestrator = self.orchestrator.with_cancellation(token);
        self
    }

    /// The store functions are saved to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn FunctionStore> {
        &self.store
    }

    /// Parses `text` into blocks.
    pub fn parse(&self, text: &str) -> Result<Vec<BlockDefinition>, BlockflowError> {
        Ok(parse_blocks(text)?)
    }

    /// Generates and saves a function for every block.
    pub async fn build(&self, blocks: &[BlockDefinition]) -> Result<BuildReport, BlockflowError> {
        self.generator.build(blocks, self.store.as_ref()).await
    }

    /// Parses, generates and runs `text`, returning the final context.
    pub async fn run_text(&self, text: &str) -> Result<Context, BlockflowError> {
        self.run_text_with_report(text).await?.run.into_result()
    }

    /// Parses, generates and runs `text`.
    ///
    /// Fails before running anything if parsing fails or any block could not
    /// be generated. Run failures are reported inside the returned report.
    pub async fn run_text_with_report(&self, text: &str) -> Result<FlowReport, BlockflowError> {
        let blocks = self.parse(text)?;
        let build = self.build(&blocks).await?;
        if let Some(failure) = build.first_failure() {
            return Err(failure.clone().into());
        }
        info!(
            blocks = blocks.len(),
            stubs = build.stub_count(),
            "functions ready"
        );

        let run = self.run_blocks(&blocks).await;
        Ok(FlowReport {
            blocks,
            build: Some(build),
            run,
        })
    }

    /// Parses `text` and runs the functions already in the store.
    pub async fn run_existing(&self, text: &str) -> Result<FlowReport, BlockflowError> {
        let blocks = self.parse(text)?;
        let run = self.run_blocks(&blocks).await;
        Ok(FlowReport {
            blocks,
            build: None,
            run,
        })
    }

    async fn run_blocks(&self, blocks: &[BlockDefinition]) -> RunReport {
        let names: Vec<&str> = blocks.iter().map(BlockDefinition::name).collect();
        self.orchestrator.run_pipeline_with_report(&names).await
    }
}
