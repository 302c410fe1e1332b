//! The context threaded through a pipeline run.
//!
//! A run owns exactly one [`Context`]. Each block function receives it by
//! value and hands back the context the next block will see.

#[cfg(test)]
mod context_tests;
mod shared;

pub use shared::Context;
