//! Rendering fields and change-log lines back into README text.
//!
//! Long values are wrapped at word boundaries onto indented continuation
//! lines, which the parser joins back with single spaces.
use chrono::{DateTime, Utc};
use dmp_core::ExtractedField;

use crate::parser::ParsedReadme;

pub const WRAP_WIDTH: usize = 80;
const CONTINUATION_INDENT: &str = "  ";

/// `Label: value`, wrapped when longer than [`WRAP_WIDTH`]
pub fn render_field(label: &str, value: &str) -> String {
    let line = format!("{}: {}", label, value);
    if line.len() <= WRAP_WIDTH || !wraps_losslessly(value) {
        return line;
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = format!("{}:", label);
    let mut has_word = false;
    for word in value.split(' ') {
        if has_word && current.len() + 1 + word.len() > WRAP_WIDTH {
            lines.push(current);
            current = format!("{}{}", CONTINUATION_INDENT, word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
        has_word = true;
    }
    lines.push(current);
    lines.join("\n")
}

// Wrapping joins pieces with one space on re-parse, so only values whose
// words are separated by exactly one space survive it unchanged.
fn wraps_losslessly(value: &str) -> bool {
    !value.is_empty()
        && value == value.trim()
        && !value.contains("  ")
        && !value.contains(['\n', '\r', '\t'])
}

/// Render a block of fields separated by blank lines
pub fn render_fields(fields: &[ExtractedField]) -> String {
    let mut out = String::new();
    for field in fields {
        out.push_str(&render_field(&field.name, &field.raw_value));
        out.push_str("\n\n");
    }
    out
}

/// Rewrite `text` with new values for `updates`, keyed by canonical name.
///
/// A field already in `parsed` is replaced where it stands, label line and
/// continuation lines together, keeping a leading `#`. Fields not present yet
/// are rendered as a block at the top. Everything else is left as written.
pub fn update_fields(text: &str, parsed: &ParsedReadme, updates: &[ExtractedField]) -> String {
    let (bom, body) = match text.strip_prefix('\u{feff}') {
        Some(rest) => ("\u{feff}", rest),
        None => ("", text),
    };
    let mut lines: Vec<String> = body.lines().map(str::to_string).collect();

    let mut in_place: Vec<(usize, usize, String)> = Vec::new();
    let mut added: Vec<ExtractedField> = Vec::new();
    for update in updates {
        match parsed.get(&update.name) {
            Some(existing) if existing.line_number >= 1 && existing.line_number <= lines.len() => {
                let start = existing.line_number - 1;
                let mut end = start + 1;
                while end < lines.len()
                    && !lines[end].trim().is_empty()
                    && lines[end].starts_with(char::is_whitespace)
                {
                    end += 1;
                }
                let prefix = if lines[start].starts_with('#') { "#" } else { "" };
                let rendered = format!("{}{}", prefix, render_field(&update.name, &update.raw_value));
                in_place.push((start, end, rendered));
            }
            _ => added.push(update.clone()),
        }
    }

    in_place.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
    for (start, end, rendered) in in_place {
        lines.splice(start..end, rendered.lines().map(str::to_string));
    }

    let mut out = String::from(bom);
    if lines.is_empty() {
        out.push_str(render_fields(&added).trim_end());
        out.push('\n');
        return out;
    }
    if !added.is_empty() {
        out.push_str(&render_fields(&added));
    }
    out.push_str(&lines.join("\n"));
    if body.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// `YYYY-MM-DD HH:MM: description`
pub fn log_line(at: DateTime<Utc>, description: &str) -> String {
    format!("{}: {}", at.format("%Y-%m-%d %H:%M"), description.trim())
}

/// README text with one change-log line appended
pub fn append_log_entry(text: &str, at: DateTime<Utc>, description: &str) -> String {
    let mut out = text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&log_line(at, description));
    out.push('\n');
    out
}
