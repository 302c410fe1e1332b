//! Test doubles for blockflow pipelines.
//!
//! - [`MockGenerationService`]: scripted generation replies, call counting
//! - [`CountingStore`]: wraps a store and counts loads per name

mod mocks;

pub use mocks::{CountingStore, MockGenerationService, ScriptedReply};
