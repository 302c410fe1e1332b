//! Event sinks for generation and pipeline observability.
//!
//! The code generator and the orchestrator report progress through an
//! [`EventSink`]. Event types are dotted names; the payload is a JSON object
//! that always carries the `block` field for per-block events.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Generation of a block started.
pub const GENERATION_STARTED: &str = "generation.started";
/// One generation attempt was rejected.
pub const GENERATION_ATTEMPT_FAILED: &str = "generation.attempt_failed";
/// A block's function was generated and validated.
pub const GENERATION_COMPLETED: &str = "generation.completed";
/// Every attempt failed and a stub was substituted.
pub const GENERATION_STUBBED: &str = "generation.stubbed";
/// Every attempt failed.
pub const GENERATION_FAILED: &str = "generation.failed";
/// A function was written to the store.
pub const FUNCTION_SAVED: &str = "function.saved";

/// A pipeline run started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Every block executed.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// The run stopped on an error.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// The run observed cancellation.
pub const PIPELINE_CANCELLED: &str = "pipeline.cancelled";

/// A block's function was loaded.
pub const BLOCK_LOADED: &str = "block.loaded";
/// A block's function returned a new context.
pub const BLOCK_COMPLETED: &str = "block.completed";
/// A block's function failed.
pub const BLOCK_FAILED: &str = "block.failed";
