//! In-memory function store.

use super::{FunctionStore, StoreLocation};
use crate::codegen::GeneratedFunction;
use crate::errors::{BlockflowError, NotFoundError};
use crate::functions::{BlockFunction, PythonFunction, PythonInterpreter};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
enum Entry {
    Source(Arc<str>),
    Native(Arc<dyn BlockFunction>),
}

/// Concurrent in-memory store.
///
/// Holds generated Python source (run through the configured interpreter on
/// load) and native functions registered directly.
#[derive(Debug)]
pub struct InMemoryFunctionStore {
    entries: DashMap<String, Entry>,
    interpreter: Arc<PythonInterpreter>,
}

impl Default for InMemoryFunctionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFunctionStore {
    /// Creates an empty store using the default interpreter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_interpreter(Arc::new(PythonInterpreter::default()))
    }

    /// Creates an empty store that runs Python source with `interpreter`.
    #[must_use]
    pub fn with_interpreter(interpreter: Arc<PythonInterpreter>) -> Self {
        Self {
            entries: DashMap::new(),
            interpreter,
        }
    }

    /// Registers a native function under its own name.
    pub fn register(&self, function: Arc<dyn BlockFunction>) {
        debug!(block = %function.name(), "registered native function");
        self.entries
            .insert(function.name().to_string(), Entry::Native(function));
    }

    /// Returns true when `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the stored Python source, if `name` holds source.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<String> {
        self.entries.get(name).and_then(|e| match e.value() {
            Entry::Source(src) => Some(src.to_string()),
            Entry::Native(_) => None,
        })
    }

    /// Stored names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of stored functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl FunctionStore for InMemoryFunctionStore {
    async fn save(&self, function: &GeneratedFunction) -> Result<StoreLocation, BlockflowError> {
        let name = function.name().to_string();
        self.entries
            .insert(name.clone(), Entry::Source(function.shared_source()));
        Ok(StoreLocation::Memory(name))
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn BlockFunction>, BlockflowError> {
        let entry = self
            .entries
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| NotFoundError::new(name))?;

        Ok(match entry {
            Entry::Native(function) => function,
            Entry::Source(source) => Arc::new(PythonFunction::new(
                name,
                source,
                Arc::clone(&self.interpreter),
            )),
        })
    }

    async fn exists(&self, name: &str) -> bool {
        self.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::functions::FnBlock;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_then_load_source() {
        let store = InMemoryFunctionStore::new();
        let f = GeneratedFunction::stub("block_1", "noop");

        let location = store.save(&f).await.unwrap();
        assert_eq!(location, StoreLocation::Memory("block_1".to_string()));
        assert!(store.exists("block_1").await);

        let loaded = store.load("block_1").await.unwrap();
        assert_eq!(loaded.name(), "block_1");
        assert_eq!(store.source("block_1").as_deref(), Some(f.source()));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryFunctionStore::new();
        store.save(&GeneratedFunction::stub("block_1", "first")).await.unwrap();
        let second = GeneratedFunction::stub("block_1", "second");
        store.save(&second).await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.source("block_1").unwrap().contains("second"));
    }

    #[tokio::test]
    async fn test_missing_name_is_not_found() {
        let store = InMemoryFunctionStore::new();
        let err = store.load("missing_block").await.unwrap_err();
        assert!(matches!(err, BlockflowError::NotFound(ref e) if e.name == "missing_block"));
    }

    #[tokio::test]
    async fn test_native_function_is_callable() {
        let store = InMemoryFunctionStore::new();
        store.register(Arc::new(FnBlock::new("block_1", |mut ctx: Context| {
            ctx.insert("x", json!(1));
            Ok(ctx)
        })));

        assert!(store.source("block_1").is_none());
        assert_eq!(store.names(), vec!["block_1".to_string()]);

        let out = store.load("block_1").await.unwrap().call(Context::new()).await.unwrap();
        assert_eq!(out.get_i64("x"), Some(1));
    }
}
