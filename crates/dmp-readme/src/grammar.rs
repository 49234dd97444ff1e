//! Label table: the field schema compiled into line patterns.
//!
//! A field line looks like `[#]<label> : <value>` where the label is the
//! field name or one of its aliases, matched case-insensitively. The line
//! must start at column 0 (indented lines are continuations).

use dmp_core::{ArchiveError, FieldDefinition, FieldSchema, Result};
use regex::{Regex, RegexBuilder};

/// One compiled row: schema index plus its label regex
#[derive(Debug, Clone)]
pub struct CompiledLabel {
    pub field_index: usize,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct LabelTable<'s> {
    schema: &'s FieldSchema,
    labels: Vec<CompiledLabel>,
}

impl<'s> LabelTable<'s> {
    pub fn compile(schema: &'s FieldSchema) -> Result<Self> {
        let labels = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(field_index, def)| {
                compile_label(def).map(|regex| CompiledLabel { field_index, regex })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { schema, labels })
    }

    pub fn schema(&self) -> &'s FieldSchema {
        self.schema
    }

    /// Match a line against every label; first hit wins (labels are unique)
    pub fn match_line<'l>(&self, line: &'l str) -> Option<(&'s FieldDefinition, &'l str)> {
        if line.starts_with(char::is_whitespace) {
            return None;
        }
        for label in &self.labels {
            if let Some(caps) = label.regex.captures(line) {
                let value = caps.name("value").map(|m| m.as_str()).unwrap_or("");
                let def = &self.schema.fields()[label.field_index];
                return Some((def, value.trim()));
            }
        }
        None
    }
}

fn compile_label(def: &FieldDefinition) -> Result<Regex> {
    let alternatives: Vec<String> = def
        .labels()
        .map(|label| label.trim().split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
        .collect();

    let pattern = format!(r"^#?[ \t]*(?:{})[ \t]*:[ \t]*(?P<value>.*)$", alternatives.join("|"));

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ArchiveError::Config(format!("invalid label for field {}: {}", def.name, e)))
}
