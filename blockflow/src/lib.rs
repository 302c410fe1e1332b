//! # Blockflow
//!
//! Turns natural-language task descriptions into executable pipelines.
//!
//! Input text is split into headed blocks. Each block is sent to a code
//! generation service, which returns a Python function `block_N(context)`.
//! Functions are validated, saved to a store, and then run in order against
//! one shared context:
//!
//! - **Block parsing**: heading-delimited text to ordered `block_1..n`
//! - **Code generation**: prompt, extract, validate, bounded retry, stubs
//! - **Function store**: in-memory or one `.py` file per block
//! - **Orchestration**: sequential run that stops on the first failure
//! - **Cancellation**: cooperative, checked between blocks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blockflow::prelude::*;
//!
//! let settings = Settings::load(None)?;
//! let service = Arc::new(OpenAiService::new(settings.generation.clone())?);
//! let flow = Flow::from_settings(&settings, service)?;
//!
//! let context = flow.run_text("### Block 1: Seed\nSet x to 1.\n").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod blocks;
pub mod cancellation;
pub mod codegen;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod flow;
pub mod functions;
pub mod orchestrator;
pub mod providers;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blocks::{parse_blocks, BlockDefinition};
    pub use crate::cancellation::CancellationToken;
    pub use crate::codegen::{BuildReport, CodeGenerator, FunctionOrigin, GeneratedFunction};
    pub use crate::config::Settings;
    pub use crate::context::Context;
    pub use crate::errors::{
        BlockflowError, CancelledError, ExecutionError, FunctionError, GenerationError,
        NotFoundError, ParseError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::flow::{Flow, FlowReport};
    pub use crate::functions::{BlockFunction, FnBlock, PythonFunction, PythonInterpreter};
    pub use crate::orchestrator::{BlockState, Orchestrator, RunReport};
    #[cfg(feature = "openai")]
    pub use crate::providers::OpenAiService;
    pub use crate::providers::{GenerationRequest, GenerationResponse, GenerationService};
    pub use crate::store::{FileFunctionStore, FunctionStore, InMemoryFunctionStore};
    pub use std::sync::Arc;
}
