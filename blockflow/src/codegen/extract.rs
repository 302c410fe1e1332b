//! Pulls the code payload out of a model reply.

const FENCE: &str = "```";
const CODE_TAGS: &[&str] = &["", "python", "py", "python3"];

/// Extracts Python source from `reply`.
///
/// Prefers the first fenced code block that defines `name`, then the first
/// fenced Python or untagged block, then the whole reply trimmed.
#[must_use]
pub fn extract_code(reply: &str, name: &str) -> String {
    let blocks = fenced_blocks(reply);
    let wanted = format!("def {name}");

    blocks
        .iter()
        .find(|b| b.contains(&wanted))
        .or_else(|| blocks.first())
        .map_or_else(|| reply.trim().to_string(), |b| b.trim_matches('\n').to_string())
}

fn fenced_blocks(reply: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<(bool, Vec<&str>)> = None;

    for line in reply.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if let Some(tag) = trimmed.strip_prefix(FENCE) {
                    let tag = tag.trim().to_ascii_lowercase();
                    current = Some((CODE_TAGS.contains(&tag.as_str()), Vec::new()));
                }
            }
            Some((keep, body)) if trimmed.starts_with(FENCE) => {
                if keep {
                    blocks.push(body.join("\n"));
                }
            }
            Some((keep, mut body)) => {
                body.push(line);
                current = Some((keep, body));
            }
        }
    }
    // A reply cut off inside a fence still yields its code.
    if let Some((true, body)) = current {
        blocks.push(body.join("\n"));
    }
    blocks
}
