//! Splits heading-delimited text into ordered block definitions.

use super::BlockDefinition;
use crate::errors::ParseError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}#{1,6}[ \t]+(?P<text>.*?)(?:[ \t]+#+)?[ \t]*$").expect("heading regex is valid")
});

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:block|step|task)\s*#?\s*\d+\s*(?:[:.)\-–—]\s*)?|\d+\s*[:.)\-–—]\s*)")
        .expect("label regex is valid")
});

struct PendingBlock {
    heading: String,
    line: usize,
    body: Vec<String>,
}

/// Parses natural-language text into block definitions.
///
/// Blocks come back in order of appearance, named `block_1`, `block_2`, and
/// so on. Text before the first heading is ignored.
///
/// # Errors
///
/// Returns [`ParseError`] when the input has no heading, or when a heading
/// has no body text before the next heading or the end of input.
pub fn parse_blocks(text: &str) -> Result<Vec<BlockDefinition>, ParseError> {
    let mut pending: Vec<PendingBlock> = Vec::new();
    let mut in_fence = false;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(caps) = HEADING.captures(line) {
                let heading = caps.name("text").map_or("", |m| m.as_str()).trim();
                if !heading.is_empty() {
                    pending.push(PendingBlock {
                        heading: heading.to_string(),
                        line: idx + 1,
                        body: Vec::new(),
                    });
                    continue;
                }
            }
        }

        if let Some(current) = pending.last_mut() {
            current.body.push(line.to_string());
        }
    }

    if pending.is_empty() {
        return Err(ParseError::new(
            "input contains no block headings (expected lines like '### Block 1: Title')",
        ));
    }

    let mut blocks = Vec::with_capacity(pending.len());
    for (position, block) in pending.into_iter().enumerate() {
        let index = position + 1;
        let description = normalize_whitespace(&block.body.join("\n"));
        if description.is_empty() {
            return Err(ParseError::new(format!(
                "heading '{}' has no description text",
                block.heading
            ))
            .with_block(super::block_name(index))
            .with_line(block.line));
        }

        let definition = BlockDefinition::new(index, strip_label(&block.heading), description);
        debug!(block = %definition.name(), title = %definition.title(), "parsed block");
        blocks.push(definition);
    }

    Ok(blocks)
}

/// Removes a leading `Block 1:`-style label from heading text.
///
/// A heading that is nothing but a label keeps its original text.
fn strip_label(heading: &str) -> String {
    let stripped = LABEL.replace(heading, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        heading.to_string()
    } else {
        stripped.to_string()
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SALES: &str = "\
# Sales report

Quarterly numbers for the west region.

### Block 1: Load sales
Read `sales.csv` and store the rows
under `sales_data`.

### Block 2: Extract amounts
For every row in `sales_data`, store the amount as `amount_<n>`.

### Block 3: Total
Sum every `amount_` key into `total_sales`.
";

    #[test]
    fn test_parses_blocks_in_source_order() {
        let blocks = parse_blocks(SALES).unwrap();

        // The top-level heading starts a block like any other.
        let names: Vec<_> = blocks.iter().map(BlockDefinition::name).collect();
        assert_eq!(names, vec!["block_1", "block_2", "block_3", "block_4"]);

        assert_eq!(blocks[0].title(), "Sales report");
        assert_eq!(blocks[1].title(), "Load sales");
        assert_eq!(
            blocks[1].description(),
            "Read `sales.csv` and store the rows under `sales_data`."
        );
        assert_eq!(blocks[3].title(), "Total");
    }

    #[test]
    fn test_preamble_before_first_heading_is_ignored() {
        let blocks = parse_blocks("intro text\nmore intro\n### Load\nread it").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].description(), "read it");
    }

    #[test]
    fn test_reparsing_is_identical() {
        let first = parse_blocks(SALES).unwrap();
        let second = parse_blocks(SALES).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_fails() {
        let err = parse_blocks("").unwrap_err();
        assert!(err.message.contains("no block headings"));
    }

    #[test]
    fn test_text_without_headings_fails() {
        assert!(parse_blocks("no headings here").is_err());
        assert!(parse_blocks("#hashtag is not a heading").is_err());
    }

    #[test]
    fn test_heading_without_body_names_block() {
        let text = "### Block 1: Load\nread the file\n\n### Block 2: Empty\n\n   \n";
        let err = parse_blocks(text).unwrap_err();

        assert_eq!(err.block.as_deref(), Some("block_2"));
        assert_eq!(err.line, Some(4));
    }

    #[test]
    fn test_heading_followed_by_heading_fails() {
        let err = parse_blocks("## First\n## Second\nbody").unwrap_err();
        assert_eq!(err.block.as_deref(), Some("block_1"));
    }

    #[test]
    fn test_duplicate_titles_keep_unique_names() {
        let text = "### Clean\nstrip blanks\n### Clean\nstrip nulls\n";
        let blocks = parse_blocks(text).unwrap();

        assert_eq!(blocks[0].title(), blocks[1].title());
        assert_eq!(blocks[0].name(), "block_1");
        assert_eq!(blocks[1].name(), "block_2");
    }

    #[test]
    fn test_label_variants_are_stripped() {
        assert_eq!(strip_label("Block 1: Load"), "Load");
        assert_eq!(strip_label("block 12 - Merge"), "Merge");
        assert_eq!(strip_label("Step 2. Filter"), "Filter");
        assert_eq!(strip_label("3) Save"), "Save");
        assert_eq!(strip_label("4. Report"), "Report");
        assert_eq!(strip_label("Blockchain sync"), "Blockchain sync");
        assert_eq!(strip_label("Block 7"), "Block 7");
    }

    #[test]
    fn test_headings_inside_fences_are_body_text() {
        let text = "### Block 1: Script\nRun this:\n```\n# not a heading\n```\n";
        let blocks = parse_blocks(text).unwrap();

        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].description().contains("# not a heading"));
    }

    #[test]
    fn test_closing_hashes_are_trimmed() {
        let blocks = parse_blocks("## Load ##\nread it").unwrap();
        assert_eq!(blocks[0].title(), "Load");
    }
}
