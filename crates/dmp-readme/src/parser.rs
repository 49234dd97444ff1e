//! README parser: recognized fields, free text, duplicates.
//!
//! Line rules:
//! - a label line opens a field (closing any open one)
//! - an indented non-blank line continues the open field, joined by one space
//! - a blank line closes the open field
//! - anything else closes the open field and is kept as free text
//!
//! Duplicate labels resolve to the last occurrence; the dropped ones are
//! reported in [`ParsedReadme::duplicates`].

use dmp_core::{ExtractedField, FieldSchema, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::grammar::LabelTable;

/// A field label that appeared again; `dropped_line` lost to `kept_line`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateField {
    pub name: String,
    pub kept_line: usize,
    pub dropped_line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReadme {
    /// One entry per recognized field, ordered by line
    pub fields: Vec<ExtractedField>,
    /// Non-blank lines that are not part of any field
    pub free_text: Vec<String>,
    pub unrecognized_lines: usize,
    pub duplicates: Vec<DuplicateField>,
}

impl ParsedReadme {
    pub fn get(&self, name: &str) -> Option<&ExtractedField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|f| f.raw_value.as_str())
    }
}

/// Parser bound to a compiled label table
#[derive(Debug, Clone)]
pub struct ReadmeParser<'s> {
    table: LabelTable<'s>,
}

struct OpenField {
    name: String,
    value: String,
    line_number: usize,
}

impl<'s> ReadmeParser<'s> {
    pub fn new(schema: &'s FieldSchema) -> Result<Self> {
        Ok(Self {
            table: LabelTable::compile(schema)?,
        })
    }

    pub fn parse(&self, text: &str) -> ParsedReadme {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut found: Vec<ExtractedField> = Vec::new();
        let mut free_text = Vec::new();
        let mut open: Option<OpenField> = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_number = idx + 1;
            let line = raw_line.trim_end();

            if line.is_empty() {
                close(&mut open, &mut found);
                continue;
            }

            if line.starts_with(char::is_whitespace) {
                if let Some(field) = open.as_mut() {
                    let piece = line.trim();
                    if !field.value.is_empty() {
                        field.value.push(' ');
                    }
                    field.value.push_str(piece);
                    continue;
                }
            }

            if let Some((def, value)) = self.table.match_line(line) {
                close(&mut open, &mut found);
                open = Some(OpenField {
                    name: def.name.clone(),
                    value: value.to_string(),
                    line_number,
                });
                continue;
            }

            close(&mut open, &mut found);
            free_text.push(line.to_string());
        }
        close(&mut open, &mut found);

        let (fields, duplicates) = resolve_duplicates(found);
        for dup in &duplicates {
            tracing::debug!(
                field = %dup.name,
                kept = dup.kept_line,
                dropped = dup.dropped_line,
                "duplicate README field, keeping last occurrence"
            );
        }

        ParsedReadme {
            fields,
            unrecognized_lines: free_text.len(),
            free_text,
            duplicates,
        }
    }
}

fn close(open: &mut Option<OpenField>, found: &mut Vec<ExtractedField>) {
    if let Some(field) = open.take() {
        found.push(ExtractedField::new(field.name, field.value, field.line_number));
    }
}

fn resolve_duplicates(found: Vec<ExtractedField>) -> (Vec<ExtractedField>, Vec<DuplicateField>) {
    let mut latest: HashMap<String, ExtractedField> = HashMap::new();
    let mut dropped: Vec<(String, usize)> = Vec::new();

    for field in found {
        if let Some(previous) = latest.insert(field.name.clone(), field) {
            dropped.push((previous.name, previous.line_number));
        }
    }

    // every dropped occurrence points at the final winner
    let duplicates = dropped
        .into_iter()
        .map(|(name, dropped_line)| DuplicateField {
            kept_line: latest[&name].line_number,
            name,
            dropped_line,
        })
        .collect();

    let mut fields: Vec<ExtractedField> = latest.into_values().collect();
    fields.sort_by_key(|f| f.line_number);
    (fields, duplicates)
}

/// Parse with a throwaway parser
pub fn parse_readme(text: &str, schema: &FieldSchema) -> Result<ParsedReadme> {
    Ok(ReadmeParser::new(schema)?.parse(text))
}
