//! Persistence for block functions.
//!
//! Functions are keyed by block name. Saving a name again replaces the
//! previous function. Loading never re-validates: whatever was saved (or
//! hand-edited on disk) is what runs.

mod file;
mod memory;

pub use file::FileFunctionStore;
pub use memory::InMemoryFunctionStore;

use crate::codegen::GeneratedFunction;
use crate::errors::BlockflowError;
use crate::functions::BlockFunction;
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a saved function lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Held in process memory.
    Memory(String),
    /// Written to a file.
    File(PathBuf),
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(name) => write!(f, "memory:{name}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl Serialize for StoreLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Saves and loads block functions by name.
#[async_trait]
pub trait FunctionStore: Send + Sync {
    /// Saves `function` under its name, replacing any previous one.
    async fn save(&self, function: &GeneratedFunction) -> Result<StoreLocation, BlockflowError>;

    /// Loads the callable for `name`.
    ///
    /// Fails with [`BlockflowError::NotFound`] when nothing was saved under
    /// that name.
    async fn load(&self, name: &str) -> Result<Arc<dyn BlockFunction>, BlockflowError>;

    /// Returns true when a function is saved under `name`.
    async fn exists(&self, name: &str) -> bool;
}

#[async_trait]
impl<T: FunctionStore + ?Sized> FunctionStore for Arc<T> {
    async fn save(&self, function: &GeneratedFunction) -> Result<StoreLocation, BlockflowError> {
        (**self).save(function).await
    }

    async fn load(&self, name: &str) -> Result<Arc<dyn BlockFunction>, BlockflowError> {
        (**self).load(name).await
    }

    async fn exists(&self, name: &str) -> bool {
        (**self).exists(name).await
    }
}
