//! Frontmatter block codec: a `---` delimited YAML mapping at the top of a
//! document, followed by free-form body text.
//!
//! Parsing is tolerant (a malformed block reads as "no header"); rendering is
//! strict about layout because the format is shared with other tools:
//! every string scalar is emitted double-quoted so a `[[link]]` value cannot
//! be reparsed as a nested flow list, and sequences are always block style,
//! one item per line.

use serde_yaml::{Mapping, Value};

const DELIMITER: &str = "---";

/// Result of splitting a document into header and body.
pub struct ParsedDoc<'a> {
    /// Parsed header mapping, if a block exists and is valid YAML.
    pub header: Option<Mapping>,
    /// Everything after the closing delimiter (or the whole document).
    pub body: &'a str,
    /// Whether a syntactic `---` block is present at all, valid or not.
    pub has_block: bool,
}

/// Split a document into its frontmatter block and body.
pub fn parse(content: &str) -> ParsedDoc<'_> {
    let Some(raw) = split_block(content) else {
        return ParsedDoc {
            header: None,
            body: content,
            has_block: false,
        };
    };
    let (yaml, body) = raw;
    let header = if yaml.trim().is_empty() {
        Some(Mapping::new())
    } else {
        serde_yaml::from_str::<Mapping>(yaml).ok()
    };
    ParsedDoc {
        header,
        body,
        has_block: true,
    }
}

/// Locate the delimited block; returns `(yaml, body)` when present.
fn split_block(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix(DELIMITER)?;
    let rest = rest.strip_prefix('\n').or_else(|| {
        rest.strip_prefix("\r\n")
    })?;
    // Closing delimiter on its own line, or closing the document.
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    // Unterminated block: not a header.
    None
}

/// Render a mapping as a frontmatter block body (no delimiters).
pub fn render(map: &Mapping) -> String {
    let mut out = String::new();
    render_mapping(&mut out, map, 0);
    out
}

/// Render a full document: delimited header followed by the body.
pub fn compose(map: &Mapping, body: &str) -> String {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    render_mapping(&mut out, map, 0);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

fn render_mapping(out: &mut String, map: &Mapping, indent: usize) {
    for (key, value) in map {
        let key = match key {
            Value::String(s) => s.clone(),
            other => scalar(other),
        };
        push_indent(out, indent);
        out.push_str(&key);
        out.push(':');
        render_value(out, value, indent);
    }
}

fn render_value(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Sequence(items) => {
            out.push('\n');
            for item in items {
                push_indent(out, indent + 1);
                out.push_str("- ");
                match item {
                    Value::Sequence(_) | Value::Mapping(_) => {
                        // Nested containers inside sequences are rare in
                        // frontmatter; fall back to their quoted YAML form.
                        out.push_str(&scalar(item));
                    }
                    other => out.push_str(&scalar(other)),
                }
                out.push('\n');
            }
        }
        Value::Mapping(inner) => {
            out.push('\n');
            render_mapping(out, inner, indent + 1);
        }
        Value::Null => out.push('\n'),
        other => {
            out.push(' ');
            out.push_str(&scalar(other));
            out.push('\n');
        }
    }
}

/// Scalar rendering: strings always double-quoted, everything else plain.
fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quoted(s),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}
