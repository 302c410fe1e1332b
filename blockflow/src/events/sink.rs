//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives generation and pipeline events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - Dotted event name, e.g. `"block.completed"`
    /// * `data` - Optional JSON payload
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting.
    ///
    /// Must never fail; sinks swallow their own errors.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`.
///
/// Failure events (`*.failed`, `*.attempt_failed`, `*.stubbed`,
/// `*.cancelled`) are always logged at WARN; everything else at the
/// configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging routine events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Routine events at DEBUG.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Routine events at INFO.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn is_failure(event_type: &str) -> bool {
        let kind = event_type.rsplit('.').next().unwrap_or(event_type);
        matches!(kind, "failed" | "attempt_failed" | "stubbed" | "cancelled")
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let block = block_of(data).unwrap_or("-");
        let payload = data.map(ToString::to_string).unwrap_or_default();
        if Self::is_failure(event_type) {
            warn!(event = %event_type, block = %block, data = %payload, "event");
        } else if self.level == Level::DEBUG || self.level == Level::TRACE {
            debug!(event = %event_type, block = %block, data = %payload, "event");
        } else {
            info!(event = %event_type, block = %block, data = %payload, "event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

fn block_of(data: Option<&Value>) -> Option<&str> {
    data.and_then(|d| d.get("block")).and_then(Value::as_str)
}

/// One event captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Dotted event name.
    pub event_type: String,
    /// The `block` field of the payload, if present.
    pub block: Option<String>,
    /// Full payload.
    pub data: Option<Value>,
}

/// Keeps every event in memory, in emission order. Meant for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        let block = block_of(data.as_ref()).map(str::to_string);
        self.events.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            block,
            data,
        });
    }

    /// Every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Event names in emission order.
    #[must_use]
    pub fn types(&self) -> Vec<String> {
        self.events.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Events whose name starts with `prefix`.
    #[must_use]
    pub fn of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Event names recorded for `block`, in order.
    #[must_use]
    pub fn for_block(&self, block: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.block.as_deref() == Some(block))
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops everything recorded so far.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_events_are_recognised() {
        assert!(LoggingEventSink::is_failure("generation.failed"));
        assert!(LoggingEventSink::is_failure("generation.attempt_failed"));
        assert!(LoggingEventSink::is_failure("pipeline.cancelled"));
        assert!(!LoggingEventSink::is_failure("block.completed"));
    }

    #[tokio::test]
    async fn test_logging_sink_accepts_any_payload() {
        let sink = LoggingEventSink::default();
        sink.emit("block.completed", Some(json!({"block": "block_1"}))).await;
        sink.try_emit("pipeline.started", None);
        LoggingEventSink::debug().try_emit("block.failed", Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_collecting_sink_keeps_order_and_block() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("generation.started", Some(json!({"block": "block_2"}))).await;
        sink.try_emit("pipeline.started", None);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].block.as_deref(), Some("block_2"));
        assert_eq!(events[1].block, None);
        assert_eq!(sink.types(), vec!["generation.started", "pipeline.started"]);
    }

    #[test]
    fn test_filters() {
        let sink = CollectingEventSink::new();
        sink.try_emit("block.loaded", Some(json!({"block": "block_1"})));
        sink.try_emit("block.completed", Some(json!({"block": "block_1"})));
        sink.try_emit("block.loaded", Some(json!({"block": "block_2"})));
        sink.try_emit("pipeline.completed", None);

        assert_eq!(sink.of_type("block.").len(), 3);
        assert_eq!(sink.of_type("pipeline.").len(), 1);
        assert_eq!(sink.for_block("block_1"), vec!["block.loaded", "block.completed"]);

        sink.clear();
        assert_eq!(sink.len(), 0);
    }
}
