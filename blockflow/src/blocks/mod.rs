//! Block definitions and the block parser.
//!
//! The input format is markdown-style text where every heading starts a new
//! block:
//!
//! ```text
//! ### Block 1: Load sales
//! Read sales.csv and store the rows under `sales_data`.
//!
//! ### Block 2: Total
//! Sum the `amount` column of `sales_data` into `total_sales`.
//! ```
//!
//! A heading is one to six `#` characters followed by whitespace and the
//! heading text. Leading labels such as `Block 1:`, `Step 2.` or `3)` are
//! stripped from the title. The body runs until the next heading or the end
//! of input; headings inside fenced code are treated as body text.

mod parser;

pub use parser::parse_blocks;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One natural-language task with a stable, position-derived name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDefinition {
    name: String,
    title: String,
    description: String,
}

impl BlockDefinition {
    /// Creates a block definition for the given 1-based position.
    #[must_use]
    pub fn new(index: usize, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: block_name(index),
            title: title.into(),
            description: description.into(),
        }
    }

    /// The unique name, `block_<n>`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The short label from the heading.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The whitespace-normalized instruction text.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for BlockDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.title)
    }
}

/// Returns the canonical name for a 1-based block position.
#[must_use]
pub fn block_name(index: usize) -> String {
    format!("block_{index}")
}
