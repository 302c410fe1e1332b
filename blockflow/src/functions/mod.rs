//! Callable block functions.
//!
//! Everything the orchestrator runs implements [`BlockFunction`]: generated
//! Python source behind the interpreter boundary ([`PythonFunction`]) as well
//! as native Rust closures ([`FnBlock`]).

mod python;

pub use python::{PythonFunction, PythonInterpreter};

use crate::context::Context;
use crate::errors::FunctionError;
use async_trait::async_trait;
use std::fmt::Debug;

/// A named step that transforms the pipeline context.
///
/// The function receives exclusive ownership of the context for the length
/// of the call and returns the context the next block will receive.
#[async_trait]
pub trait BlockFunction: Send + Sync + Debug {
    /// Returns the block name this function is stored under.
    fn name(&self) -> &str;

    /// Runs the function against the context.
    async fn call(&self, context: Context) -> Result<Context, FunctionError>;
}

/// A native Rust closure exposed as a block function.
pub struct FnBlock<F>
where
    F: Fn(Context) -> Result<Context, FunctionError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnBlock<F>
where
    F: Fn(Context) -> Result<Context, FunctionError> + Send + Sync,
{
    /// Creates a new closure-backed block function.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnBlock<F>
where
    F: Fn(Context) -> Result<Context, FunctionError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBlock").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> BlockFunction for FnBlock<F>
where
    F: Fn(Context) -> Result<Context, FunctionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: Context) -> Result<Context, FunctionError> {
        (self.func)(context)
    }
}

/// Returns the context unchanged.
#[derive(Debug, Clone)]
pub struct PassThrough {
    name: String,
}

impl PassThrough {
    /// Creates a new pass-through function.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl BlockFunction for PassThrough {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: Context) -> Result<Context, FunctionError> {
        Ok(context)
    }
}
