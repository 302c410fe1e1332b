//! Mock generation service and store wrappers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::codegen::GeneratedFunction;
use crate::errors::{BlockflowError, GenerationError};
use crate::functions::BlockFunction;
use crate::providers::{GenerationRequest, GenerationResponse, GenerationService};
use crate::store::{FunctionStore, StoreLocation};

/// One scripted answer from [`MockGenerationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// A successful reply with this text.
    Code(String),
    /// The service answers but reports `success == false`.
    Reject(String),
    /// The call itself fails.
    Fail(String),
    /// A successful reply with no text.
    Empty,
}

/// A generation service that replays scripted answers per block.
///
/// Replies queued for a block are consumed in order; the last one repeats.
/// Blocks with no script get a pass-through function in pass-through mode
/// and a rejection otherwise.
#[derive(Debug, Default)]
pub struct MockGenerationService {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    passthrough: bool,
    latency: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerationService {
    /// Creates a mock that rejects unscripted blocks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that answers unscripted blocks with
    /// `def <name>(context: dict) -> dict: return context`.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Self::default()
        }
    }

    /// Queues a reply for `block`.
    #[must_use]
    pub fn with_reply(self, block: impl Into<String>, reply: ScriptedReply) -> Self {
        self.scripts
            .lock()
            .entry(block.into())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queues a successful reply with `text` for `block`.
    #[must_use]
    pub fn with_code(self, block: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_reply(block, ScriptedReply::Code(text.into()))
    }

    /// Adds latency to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of calls for `block`.
    #[must_use]
    pub fn calls_for(&self, block: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.block_name == block)
            .count()
    }

    /// All requests received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, block: &str) -> ScriptedReply {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(block) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(ScriptedReply::Empty),
            Some(queue) => queue.front().cloned().unwrap_or(ScriptedReply::Empty),
            None if self.passthrough => ScriptedReply::Code(format!(
                "def {block}(context: dict) -> dict:\n    return context\n"
            )),
            None => ScriptedReply::Reject(format!("no scripted reply for {block}")),
        }
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let block = request.block_name.clone();
        self.requests.lock().push(request);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.next_reply(&block) {
            ScriptedReply::Code(text) => Ok(GenerationResponse::ok(text).with_model("mock")),
            ScriptedReply::Reject(error) => Ok(GenerationResponse::failed(error)),
            ScriptedReply::Fail(error) => Err(GenerationError::service(block, error)),
            ScriptedReply::Empty => Ok(GenerationResponse::ok("")),
        }
    }
}

/// Wraps a store and counts `load` calls per name.
#[derive(Debug)]
pub struct CountingStore<S> {
    inner: S,
    loads: Mutex<HashMap<String, usize>>,
}

impl<S: FunctionStore> CountingStore<S> {
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// Number of `load` calls for `name`.
    #[must_use]
    pub fn load_count(&self, name: &str) -> usize {
        self.loads.lock().get(name).copied().unwrap_or(0)
    }

    /// Total `load` calls.
    #[must_use]
    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: FunctionStore> FunctionStore for CountingStore<S> {
    async fn save(&self, function: &GeneratedFunction) -> Result<StoreLocation, BlockflowError> {
        self.inner.save(function).await
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn BlockFunction>, BlockflowError> {
        *self.loads.lock().entry(name.to_string()).or_insert(0) += 1;
        self.inner.load(name).await
    }

    async fn exists(&self, name: &str) -> bool {
        self.inner.exists(name).await
    }
}
