//! Turning block definitions into validated functions.
//!
//! [`build_prompt`], [`extract_code`] and [`validate_function`] are plain
//! string functions. [`CodeGenerator`] wires them to a [`GenerationService`] with timeouts,
//! retries and an optional stub fallback.
//!
//! [`GenerationService`]: crate::providers::GenerationService

mod extract;
mod generator;
mod prompt;
mod retry;
mod validate;

pub use extract::extract_code;
pub use generator::{BuildReport, BuiltBlock, CodeGenerator};
pub use prompt::{build_prompt, build_request, request_for};
pub use validate::{validate_function, ValidationError};

pub(crate) use validate::is_identifier;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Where a function's source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionOrigin {
    /// Produced by the generation service and validated.
    Generated,
    /// Placeholder substituted after generation failed.
    Stub,
}

impl fmt::Display for FunctionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => write!(f, "generated"),
            Self::Stub => write!(f, "stub"),
        }
    }
}

/// Marker placed in stub functions.
pub const STUB_MARKER: &str = "NEEDS MANUAL COMPLETION";

/// Validated source for one block.
///
/// Only constructible through [`GeneratedFunction::validated`] or
/// [`GeneratedFunction::stub`]; regenerating a block produces a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFunction {
    name: String,
    source: Arc<str>,
    origin: FunctionOrigin,
}

impl GeneratedFunction {
    /// Validates `source` as the function for block `name`.
    pub fn validated(name: impl Into<String>, source: &str) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_function(source, &name)?;
        let mut source = source.trim_end().to_string();
        source.push('\n');
        Ok(Self {
            name,
            source: source.into(),
            origin: FunctionOrigin::Generated,
        })
    }

    /// A function that returns the context unchanged, marked for manual
    /// completion.
    #[must_use]
    pub fn stub(name: impl Into<String>, description: &str) -> Self {
        let name = name.into();
        let note: String = description
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let source = format!(
            "def {name}(context: dict) -> dict:\n    # {STUB_MARKER}\n    # {}\n    return context\n",
            note.trim()
        );
        Self {
            name,
            source: source.into(),
            origin: FunctionOrigin::Stub,
        }
    }

    /// Block name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Python source, newline-terminated.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shared handle to the source.
    #[must_use]
    pub fn shared_source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    /// Generated or stub.
    #[must_use]
    pub fn origin(&self) -> FunctionOrigin {
        self.origin
    }

    /// SHA-256 of the source, hex encoded.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.source.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_normalizes_trailing_whitespace() {
        let f = GeneratedFunction::validated("block_1", "def block_1(c):\n    return c\n\n\n")
            .unwrap();
        assert_eq!(f.source(), "def block_1(c):\n    return c\n");
        assert_eq!(f.origin(), FunctionOrigin::Generated);
    }

    #[test]
    fn test_validated_rejects_invalid_source() {
        assert!(GeneratedFunction::validated("block_1", "return 5").is_err());
    }

    #[test]
    fn test_stub_is_valid_and_marked() {
        let stub = GeneratedFunction::stub("block_2", "Fetch data\nfrom the API.");
        assert_eq!(stub.origin(), FunctionOrigin::Stub);
        assert!(stub.source().contains(STUB_MARKER));
        assert!(stub.source().contains("# Fetch data from the API."));
        assert!(validate_function(stub.source(), "block_2").is_ok());
    }

    #[test]
    fn test_digest_is_stable_and_source_sensitive() {
        let a = GeneratedFunction::stub("block_1", "x");
        let b = GeneratedFunction::stub("block_1", "x");
        let c = GeneratedFunction::stub("block_1", "y");
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(FunctionOrigin::Generated.to_string(), "generated");
        assert_eq!(
            serde_json::to_string(&FunctionOrigin::Stub).unwrap(),
            r#""stub""#
        );
    }
}
