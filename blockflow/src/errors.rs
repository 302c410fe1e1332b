//! Error types for the blockflow engine.
//!
//! Each failure class of the pipeline has its own error struct so callers can
//! match on it precisely, and [`BlockflowError`] ties them together for code
//! that just needs to propagate with `?`.

use crate::context::Context;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for blockflow operations.
#[derive(Debug, Error)]
pub enum BlockflowError {
    /// The natural-language input could not be split into blocks.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// Code generation for a block failed and was not recovered.
    #[error("{0}")]
    Generation(#[from] GenerationError),

    /// A referenced block has no saved function.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// A loaded block function failed while running.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// The run was cancelled between blocks.
    #[error("{0}")]
    Cancelled(#[from] CancelledError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlockflowError {
    /// Returns the name of the block the error refers to, if any.
    #[must_use]
    pub fn block_name(&self) -> Option<&str> {
        match self {
            Self::Parse(e) => e.block.as_deref(),
            Self::Generation(e) => Some(&e.block),
            Self::NotFound(e) => Some(&e.name),
            Self::Execution(e) => Some(&e.block),
            Self::Cancelled(e) => e.next_block.as_deref(),
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) => None,
        }
    }

    /// Short machine-readable kind, used in events and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "ParseError",
            Self::Generation(_) => "GenerationError",
            Self::NotFound(_) => "NotFoundError",
            Self::Execution(_) => "ExecutionError",
            Self::Cancelled(_) => "Cancelled",
            Self::Config(_) => "ConfigError",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IoError",
        }
    }

    /// Converts to a dictionary representation for diagnostics.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = match self {
            Self::Parse(e) => e.to_dict(),
            Self::Generation(e) => e.to_dict(),
            Self::NotFound(e) => e.to_dict(),
            Self::Execution(e) => e.to_dict(),
            Self::Cancelled(e) => e.to_dict(),
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) => HashMap::new(),
        };
        map.insert("type".to_string(), json!(self.kind()));
        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for BlockflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Raised when the input text is empty, has no headings, or has a heading
/// without body text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Parse error{}: {message}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
pub struct ParseError {
    /// Human-readable cause.
    pub message: String,
    /// The block the error belongs to, when one was identified.
    pub block: Option<String>,
    /// 1-based line of the offending heading.
    pub line: Option<usize>,
}

impl ParseError {
    /// Creates a new parse error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            block: None,
            line: None,
        }
    }

    /// Sets the block involved.
    #[must_use]
    pub fn with_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    /// Sets the line number.
    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("reason".to_string(), json!(self.message));
        if let Some(ref block) = self.block {
            map.insert("block".to_string(), json!(block));
        }
        if let Some(line) = self.line {
            map.insert("line".to_string(), json!(line));
        }
        map
    }
}

/// Why a generation attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationFailure {
    /// The service call itself failed or reported `success == false`.
    Service,
    /// The service did not answer within the configured timeout.
    Timeout,
    /// The service answered with no usable text.
    EmptyOutput,
    /// The payload did not pass static validation.
    InvalidPayload,
}

impl GenerationFailure {
    /// Returns a stable label for logs and events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Timeout => "timeout",
            Self::EmptyOutput => "empty_output",
            Self::InvalidPayload => "invalid_payload",
        }
    }
}

/// Raised when code generation for a block fails.
#[derive(Debug, Clone, Error)]
#[error("Generation failed for block '{block}' ({}): {message}", failure.as_str())]
pub struct GenerationError {
    /// The block being generated.
    pub block: String,
    /// The failure class.
    pub failure: GenerationFailure,
    /// Human-readable cause.
    pub message: String,
    /// Number of attempts made before giving up.
    pub attempts: usize,
}

impl GenerationError {
    /// Creates a new generation error for a single attempt.
    #[must_use]
    pub fn new(
        block: impl Into<String>,
        failure: GenerationFailure,
        message: impl Into<String>,
    ) -> Self {
        Self {
            block: block.into(),
            failure,
            message: message.into(),
            attempts: 1,
        }
    }

    /// Service call failure.
    #[must_use]
    pub fn service(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(block, GenerationFailure::Service, message)
    }

    /// Timeout.
    #[must_use]
    pub fn timeout(block: impl Into<String>, seconds: f64) -> Self {
        Self::new(
            block,
            GenerationFailure::Timeout,
            format!("generation service did not respond within {seconds}s"),
        )
    }

    /// Empty completion.
    #[must_use]
    pub fn empty_output(block: impl Into<String>) -> Self {
        Self::new(
            block,
            GenerationFailure::EmptyOutput,
            "generation service returned no code",
        )
    }

    /// Payload rejected by validation.
    #[must_use]
    pub fn invalid_payload(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(block, GenerationFailure::InvalidPayload, message)
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("block".to_string(), json!(self.block));
        map.insert("failure".to_string(), json!(self.failure.as_str()));
        map.insert("reason".to_string(), json!(self.message));
        map.insert("attempts".to_string(), json!(self.attempts));
        map
    }
}

/// Raised when no function has been saved under a block name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No function saved for block '{name}'{}", location.as_ref().map(|l| format!(" (looked in {l})")).unwrap_or_default())]
pub struct NotFoundError {
    /// The requested block name.
    pub name: String,
    /// Where the store looked, when meaningful.
    pub location: Option<String>,
}

impl NotFoundError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: None,
        }
    }

    /// Sets the location that was searched.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("block".to_string(), json!(self.name));
        if let Some(ref location) = self.location {
            map.insert("location".to_string(), json!(location));
        }
        map
    }
}

/// The cause reported by a block function that failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{error_type}: {message}")]
pub struct FunctionError {
    /// Error class, e.g. `KeyError` for Python functions.
    pub error_type: String,
    /// Error message.
    pub message: String,
    /// Optional traceback or detail text.
    pub detail: Option<String>,
}

impl FunctionError {
    /// Creates a new function error.
    #[must_use]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Creates a plain runtime error.
    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }

    /// Sets the detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Raised when a loaded function fails during a pipeline run.
///
/// Carries the context as it stood after the last completed block. That
/// context is for diagnostics only; it is not a valid final result.
#[derive(Debug, Clone, Error)]
#[error("Block '{block}' failed: {cause}")]
pub struct ExecutionError {
    /// The failing block.
    pub block: String,
    /// The original error raised by the function.
    pub cause: FunctionError,
    /// Context as of the last completed block.
    pub partial_context: Context,
    /// Blocks that completed before the failure, in order.
    pub completed: Vec<String>,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(block: impl Into<String>, cause: FunctionError, partial_context: Context) -> Self {
        Self {
            block: block.into(),
            cause,
            partial_context,
            completed: Vec::new(),
        }
    }

    /// Sets the completed block list.
    #[must_use]
    pub fn with_completed(mut self, completed: Vec<String>) -> Self {
        self.completed = completed;
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("block".to_string(), json!(self.block));
        map.insert("error_type".to_string(), json!(self.cause.error_type));
        map.insert("reason".to_string(), json!(self.cause.message));
        if let Some(ref detail) = self.cause.detail {
            map.insert("detail".to_string(), json!(detail));
        }
        map.insert("completed".to_string(), json!(self.completed));
        map.insert(
            "partial_context".to_string(),
            Value::Object(self.partial_context.clone().into_inner()),
        );
        map
    }
}

/// Raised when a run observes cancellation before starting a block.
#[derive(Debug, Clone, Error)]
#[error("Pipeline cancelled{}: {reason}", next_block.as_ref().map(|b| format!(" before block '{b}'")).unwrap_or_default())]
pub struct CancelledError {
    /// The cancellation reason.
    pub reason: String,
    /// The block that would have run next.
    pub next_block: Option<String>,
    /// The last block that fully completed.
    pub last_completed: Option<String>,
    /// Context as of the last completed block.
    pub context: Context,
}

impl CancelledError {
    /// Creates a new cancellation error.
    #[must_use]
    pub fn new(reason: impl Into<String>, context: Context) -> Self {
        Self {
            reason: reason.into(),
            next_block: None,
            last_completed: None,
            context,
        }
    }

    /// Sets the next block.
    #[must_use]
    pub fn before_block(mut self, block: impl Into<String>) -> Self {
        self.next_block = Some(block.into());
        self
    }

    /// Sets the last completed block.
    #[must_use]
    pub fn after_block(mut self, block: Option<String>) -> Self {
        self.last_completed = block;
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("reason".to_string(), json!(self.reason));
        map.insert("next_block".to_string(), json!(self.next_block));
        map.insert("last_completed".to_string(), json!(self.last_completed));
        map
    }
}
