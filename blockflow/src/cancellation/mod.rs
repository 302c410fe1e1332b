//! Cooperative cancellation for pipeline runs.
//!
//! The orchestrator checks the token before every block. A block that is
//! already running is never interrupted.

mod token;

pub use token::CancellationToken;
