//! Static checks on generated Python source.
//!
//! A structural pass runs first so the usual ways model output breaks
//! (truncated strings, unbalanced brackets, ragged indentation, prose instead
//! of code, the wrong signature) get specific messages. The whole source is
//! then parsed with the tree-sitter Python grammar, which rejects anything
//! else that is not valid Python.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tree_sitter::{Node, Parser};

static DEF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+)?def\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .expect("def regex is valid")
});

const TAB_WIDTH: usize = 8;

/// Why a source payload was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}{}", line.map(|l| format!(" (line {l})")).unwrap_or_default())]
pub struct ValidationError {
    /// What is wrong.
    pub message: String,
    /// 1-based line, when the problem has one.
    pub line: Option<usize>,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

/// One logical line: physical lines joined across brackets and `\`.
#[derive(Debug)]
struct LogicalLine {
    number: usize,
    indent: usize,
    text: String,
}

/// Checks that `source` is well-formed and defines `name` at top level
/// taking exactly one positional parameter.
pub fn validate_function(source: &str, name: &str) -> Result<(), ValidationError> {
    if source.trim().is_empty() {
        return Err(ValidationError::new("source is empty"));
    }
    let normalized = source.replace("\r\n", "\n");
    let lines = scan(&normalized)?;
    check_indentation(&lines)?;

    let def = lines
        .iter()
        .filter(|l| l.indent == 0)
        .find(|l| {
            DEF_LINE
                .captures(&l.text)
                .is_some_and(|c| &c["name"] == name)
        })
        .ok_or_else(|| {
            ValidationError::new(format!("no top-level function named '{name}'"))
        })?;

    let params = parameter_list(&def.text)
        .ok_or_else(|| ValidationError::at(def.number, "malformed parameter list"))?;
    check_parameters(&params, name).map_err(|mut e| {
        e.line = Some(def.number);
        e
    })?;

    check_syntax(&normalized)
}

fn check_syntax(source: &str) -> Result<(), ValidationError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ValidationError::new(format!("python grammar unavailable: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ValidationError::new("source could not be parsed"))?;

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    match first_error(root) {
        Some(node) if node.is_missing() => Err(ValidationError::at(
            node.start_position().row + 1,
            format!("invalid syntax: missing '{}'", node.kind()),
        )),
        Some(node) => Err(ValidationError::at(
            node.start_position().row + 1,
            "invalid syntax",
        )),
        None => Err(ValidationError::new("invalid syntax")),
    }
}

/// Leftmost error or missing node under `node`.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// Returns true for a valid Python identifier made of ASCII characters.
pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn scan(source: &str) -> Result<Vec<LogicalLine>, ValidationError> {
    let chars: Vec<char> = source.chars().collect();
    let mut lines = Vec::new();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut text = String::new();
    let mut indent: Option<usize> = None;
    let mut start = 1;
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        if indent.is_none() {
            let (width, consumed, mixed) = measure_indent(&chars[i..]);
            let j = i + consumed;
            match chars.get(j) {
                None => break,
                Some('\n') => {
                    line += 1;
                    i = j + 1;
                    continue;
                }
                Some('#') => {
                    i = skip_comment(&chars, j);
                    continue;
                }
                Some(_) => {}
            }
            if mixed {
                return Err(ValidationError::at(
                    line,
                    "inconsistent use of tabs and spaces in indentation",
                ));
            }
            indent = Some(width);
            start = line;
            i = j;
            continue;
        }

        let c = chars[i];
        match c {
            '#' => {
                i = skip_comment(&chars, i);
                continue;
            }
            '\'' | '"' => {
                let end = skip_string(&chars, i, &mut line)?;
                text.extend(&chars[i..end]);
                i = end;
                continue;
            }
            '(' | '[' | '{' => brackets.push((c, line)),
            ')' | ']' | '}' => match brackets.pop() {
                Some((open, _)) if closing_for(open) == c => {}
                Some((open, _)) => {
                    return Err(ValidationError::at(
                        line,
                        format!("closing '{c}' does not match opening '{open}'"),
                    ));
                }
                None => {
                    return Err(ValidationError::at(line, format!("unmatched '{c}'")));
                }
            },
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                text.push(' ');
                line += 1;
                i += 2;
                continue;
            }
            '\n' => {
                line += 1;
                i += 1;
                if brackets.is_empty() {
                    lines.push(LogicalLine {
                        number: start,
                        indent: indent.take().unwrap_or(0),
                        text: text.trim_end().to_string(),
                    });
                    text.clear();
                } else {
                    text.push(' ');
                }
                continue;
            }
            _ => {}
        }
        text.push(c);
        i += 1;
    }

    if let Some((open, at)) = brackets.last() {
        return Err(ValidationError::at(*at, format!("'{open}' was never closed")));
    }
    if let Some(width) = indent {
        if !text.trim().is_empty() {
            lines.push(LogicalLine {
                number: start,
                indent: width,
                text: text.trim_end().to_string(),
            });
        }
    }
    Ok(lines)
}

fn measure_indent(chars: &[char]) -> (usize, usize, bool) {
    let mut width = 0;
    let mut consumed = 0;
    let (mut spaces, mut tabs) = (false, false);
    for &c in chars {
        match c {
            ' ' => {
                width += 1;
                spaces = true;
            }
            '\t' => {
                width = (width / TAB_WIDTH + 1) * TAB_WIDTH;
                tabs = true;
            }
            '\x0c' => {}
            _ => break,
        }
        consumed += 1;
    }
    (width, consumed, spaces && tabs)
}

fn skip_comment(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| from + p)
}

/// Returns the index just past the string literal starting at `start`.
fn skip_string(chars: &[char], start: usize, line: &mut usize) -> Result<usize, ValidationError> {
    let quote = chars[start];
    let opened_at = *line;
    let triple = chars.get(start + 1) == Some(&quote) && chars.get(start + 2) == Some(&quote);

    let mut j = start + if triple { 3 } else { 1 };
    loop {
        match chars.get(j) {
            None if triple => {
                return Err(ValidationError::at(
                    opened_at,
                    "unterminated triple-quoted string literal",
                ));
            }
            None => {
                return Err(ValidationError::at(opened_at, "unterminated string literal"));
            }
            Some('\\') => {
                if chars.get(j + 1) == Some(&'\n') {
                    *line += 1;
                }
                j += 2;
            }
            Some('\n') if !triple => {
                return Err(ValidationError::at(opened_at, "unterminated string literal"));
            }
            Some('\n') => {
                *line += 1;
                j += 1;
            }
            Some(&c) if c == quote => {
                if !triple {
                    return Ok(j + 1);
                }
                if chars.get(j + 1) == Some(&quote) && chars.get(j + 2) == Some(&quote) {
                    return Ok(j + 3);
                }
                j += 1;
            }
            Some(_) => j += 1,
        }
    }
}

const fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn check_indentation(lines: &[LogicalLine]) -> Result<(), ValidationError> {
    let mut levels = vec![0usize];
    let mut expect_block = false;

    for l in lines {
        let top = levels.last().copied().unwrap_or(0);
        if expect_block {
            if l.indent <= top {
                return Err(ValidationError::at(l.number, "expected an indented block"));
            }
            levels.push(l.indent);
        } else if l.indent > top {
            return Err(ValidationError::at(l.number, "unexpected indent"));
        } else {
            while levels.len() > 1 && l.indent < levels.last().copied().unwrap_or(0) {
                levels.pop();
            }
            if levels.last().copied().unwrap_or(0) != l.indent {
                return Err(ValidationError::at(
                    l.number,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        expect_block = l.text.ends_with(':');
    }

    if expect_block {
        let last = lines.last().map_or(1, |l| l.number);
        return Err(ValidationError::at(
            last,
            "expected an indented block at end of input",
        ));
    }
    Ok(())
}

/// Text between the parentheses of a `def` line.
fn parameter_list(def_line: &str) -> Option<String> {
    let open = def_line.find('(')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in def_line[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(def_line[open + 1..open + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(params: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in params.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            current.push(c);
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    if parts.len() > 1 && parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    parts
}

fn check_parameters(params: &str, name: &str) -> Result<(), ValidationError> {
    let mut positional = Vec::new();
    for param in split_top_level(params) {
        if param.is_empty() {
            if params.trim().is_empty() {
                break;
            }
            return Err(ValidationError::new("empty parameter in signature"));
        }
        if param == "/" {
            continue;
        }
        if param.starts_with("**") {
            return Err(ValidationError::new(format!(
                "function '{name}' must not take **kwargs"
            )));
        }
        if param.starts_with('*') {
            return Err(ValidationError::new(format!(
                "function '{name}' must not take *args or keyword-only parameters"
            )));
        }
        let ident = param
            .split(|c| c == ':' || c == '=')
            .next()
            .unwrap_or_default()
            .trim();
        if !is_identifier(ident) {
            return Err(ValidationError::new(format!("invalid parameter '{param}'")));
        }
        positional.push(ident.to_string());
    }

    if positional.len() != 1 {
        return Err(ValidationError::new(format!(
            "function '{name}' must take exactly one parameter (the context), found {}",
            positional.len()
        )));
    }
    Ok(())
}
