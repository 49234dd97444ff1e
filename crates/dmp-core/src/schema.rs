//! Field Schema: the declarative table of recognized DMP fields.
//!
//! Each definition carries its label aliases, value kind, required flag and
//! the validator rule applied to raw values. Extending the schema (in code
//! or through a YAML document) never touches the parser.
//!
//! ```yaml
//! version: "1"
//! fields:
//!   - name: Owner
//!     aliases: [PI]
//!     required: true
//!     kind: person
//!   - name: Grant
//!     rule: pattern
//!     pattern: "[A-Z]{2}-\\d{4}"
//! ```

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{ArchiveError, Result};
use crate::hashing::HASH_PREFIX;

// Labels of the summary block appended to a retained README
pub const ARCHIVED_AT: &str = "Archived-At";
pub const ARCHIVE_CHECKSUM: &str = "Archive-Checksum";
pub const ARCHIVE_PATH: &str = "Archive-Path";
pub const ENTRY_COUNT: &str = "Entry-Count";
pub const TOTAL_BYTES: &str = "Total-Bytes";

pub const SUMMARY_BEGIN: &str = "<!-- dmp-archive:begin -->";
pub const SUMMARY_END: &str = "<!-- dmp-archive:end -->";

/// Values that stand in for "not filled in yet"
const PLACEHOLDERS: &[&str] = &["missing", "tbd", "todo", "n/a", "na", "none", "-", "?", "unknown"];

/// Process-wide default schema, built on first use and never mutated
pub static DEFAULT_SCHEMA: Lazy<FieldSchema> = Lazy::new(FieldSchema::dmp_default);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Date,
    Person,
    FreeText,
}

impl ValueKind {
    pub fn default_rule(self) -> ValueRule {
        match self {
            ValueKind::Text => ValueRule::NonEmpty,
            ValueKind::Date => ValueRule::Date,
            ValueKind::Person => ValueRule::Person,
            ValueKind::FreeText => ValueRule::Any,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueKind::Text => write!(f, "text"),
            ValueKind::Date => write!(f, "date"),
            ValueKind::Person => write!(f, "person"),
            ValueKind::FreeText => write!(f, "free_text"),
        }
    }
}

/// Rule names accepted in schema documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleName {
    NonEmpty,
    Date,
    Person,
    Any,
    Integer,
    Checksum,
    Pattern,
}

/// Validator predicate over a raw field value
#[derive(Debug, Clone)]
pub enum ValueRule {
    NonEmpty,
    /// `YYYY-MM-DD` or RFC 3339
    Date,
    Person,
    Any,
    /// Non-negative decimal integer
    Integer,
    /// `blake3:` followed by 64 lowercase hex digits
    Checksum,
    /// Whole-value regex match
    Pattern(Regex),
}

impl ValueRule {
    /// Compile a whole-value pattern rule
    pub fn pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| ArchiveError::Config(format!("invalid field pattern {:?}: {}", pattern, e)))?;
        Ok(ValueRule::Pattern(regex))
    }

    /// Check a raw value; `Err` holds the reason shown to the user
    pub fn check(&self, raw: &str) -> std::result::Result<(), String> {
        let value = raw.trim();
        match self {
            ValueRule::Any => Ok(()),
            ValueRule::NonEmpty => {
                if value.is_empty() {
                    Err("value is empty".to_string())
                } else {
                    Ok(())
                }
            }
            ValueRule::Date => {
                if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
                    || DateTime::parse_from_rfc3339(value).is_ok()
                {
                    Ok(())
                } else {
                    Err(format!("{:?} is not a YYYY-MM-DD or RFC 3339 date", value))
                }
            }
            ValueRule::Person => {
                if value.chars().any(char::is_control) {
                    Err("person name contains control characters".to_string())
                } else if !value.chars().any(char::is_alphabetic) {
                    Err(format!("{:?} does not look like a person's name", value))
                } else {
                    Ok(())
                }
            }
            ValueRule::Integer => value
                .parse::<u64>()
                .map(|_| ())
                .map_err(|_| format!("{:?} is not a non-negative integer", value)),
            ValueRule::Checksum => {
                let hex = value.strip_prefix(HASH_PREFIX).unwrap_or("");
                if hex.len() == 64 && hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
                    Ok(())
                } else {
                    Err(format!("{:?} is not a {}<64 hex digits> checksum", value, HASH_PREFIX))
                }
            }
            ValueRule::Pattern(regex) => {
                if regex.is_match(value) {
                    Ok(())
                } else {
                    Err(format!("{:?} does not match {}", value, regex.as_str()))
                }
            }
        }
    }
}

/// One row of the schema table
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub aliases: Vec<String>,
    pub required: bool,
    pub value_kind: ValueKind,
    pub rule: ValueRule,
    /// Presence means the directory was already archived
    pub sentinel: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            required: false,
            value_kind,
            rule: value_kind.default_rule(),
            sentinel: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_rule(mut self, rule: ValueRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn sentinel(mut self) -> Self {
        self.sentinel = true;
        self
    }

    /// Name followed by aliases
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn validate(&self, raw: &str) -> std::result::Result<(), String> {
        self.rule.check(raw)
    }
}

/// Schema document as written in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    #[serde(default = "default_version")]
    pub version: String,
    pub fields: Vec<FieldSpec>,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_kind")]
    pub kind: ValueKind,
    #[serde(default)]
    pub rule: Option<RuleName>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub sentinel: bool,
}

fn default_kind() -> ValueKind {
    ValueKind::Text
}

impl FieldSpec {
    fn compile(self) -> Result<FieldDefinition> {
        let rule = match (self.rule, self.pattern.as_deref()) {
            (Some(RuleName::Pattern), Some(p)) | (None, Some(p)) => ValueRule::pattern(p)?,
            (Some(RuleName::Pattern), None) => {
                return Err(ArchiveError::Config(format!(
                    "field {} uses rule `pattern` without a pattern",
                    self.name
                )))
            }
            (Some(RuleName::NonEmpty), _) => ValueRule::NonEmpty,
            (Some(RuleName::Date), _) => ValueRule::Date,
            (Some(RuleName::Person), _) => ValueRule::Person,
            (Some(RuleName::Any), _) => ValueRule::Any,
            (Some(RuleName::Integer), _) => ValueRule::Integer,
            (Some(RuleName::Checksum), _) => ValueRule::Checksum,
            (None, None) => self.kind.default_rule(),
        };

        Ok(FieldDefinition {
            name: self.name,
            aliases: self.aliases,
            required: self.required,
            value_kind: self.kind,
            rule,
            sentinel: self.sentinel,
        })
    }
}

/// The set of recognized fields, in declaration order
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<FieldDefinition>,
}

impl FieldSchema {
    /// Build a schema. The archive summary fields are appended when the
    /// caller did not declare them, so retained READMEs stay recognizable
    /// under every schema. A redeclared `Archive-Checksum` always stays the
    /// sentinel.
    pub fn new(mut fields: Vec<FieldDefinition>) -> Result<Self> {
        for field in fields.iter_mut() {
            if field.name.eq_ignore_ascii_case(ARCHIVE_CHECKSUM) && !field.sentinel {
                tracing::debug!(field = %field.name, "marking redeclared field as archive sentinel");
                field.sentinel = true;
            }
        }
        for summary in archive_summary_fields() {
            if !fields.iter().any(|f| f.name.eq_ignore_ascii_case(&summary.name)) {
                fields.push(summary);
            }
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(ArchiveError::Config("field with empty name".to_string()));
            }
            for label in field.labels() {
                if !seen.insert(label.trim().to_lowercase()) {
                    return Err(ArchiveError::Config(format!(
                        "label {:?} is declared more than once",
                        label
                    )));
                }
            }
        }

        Ok(Self { fields })
    }

    /// Load and compile a schema from a YAML file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchiveError::Config(format!("failed to read schema file {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    /// Compile a schema from YAML content
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: SchemaFile = serde_yaml::from_str(yaml)
            .map_err(|e| ArchiveError::Config(format!("failed to parse schema YAML: {}", e)))?;
        tracing::debug!(version = %file.version, fields = file.fields.len(), "compiling field schema");

        let fields = file
            .fields
            .into_iter()
            .map(FieldSpec::compile)
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    /// Mandatory DMP fields (Owner, Date, Desc) plus the optional Title
    pub fn dmp_default() -> Self {
        Self {
            fields: default_fields(),
        }
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Look up by canonical name, case-insensitively
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn required(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn sentinels(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.sentinel)
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        DEFAULT_SCHEMA.clone()
    }
}

fn default_fields() -> Vec<FieldDefinition> {
    let mut fields = vec![
        FieldDefinition::new("Title", ValueKind::Text),
        FieldDefinition::new("Owner", ValueKind::Person)
            .required()
            .alias("PI")
            .alias("Principal Investigator"),
        FieldDefinition::new("Date", ValueKind::Date).required().alias("Created"),
        FieldDefinition::new("Desc", ValueKind::FreeText)
            .required()
            .alias("Description"),
    ];
    fields.extend(archive_summary_fields());
    fields
}

fn archive_summary_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new(ARCHIVED_AT, ValueKind::Date),
        FieldDefinition::new(ARCHIVE_CHECKSUM, ValueKind::Text)
            .with_rule(ValueRule::Checksum)
            .sentinel(),
        FieldDefinition::new(ARCHIVE_PATH, ValueKind::Text),
        FieldDefinition::new(ENTRY_COUNT, ValueKind::Text).with_rule(ValueRule::Integer),
        FieldDefinition::new(TOTAL_BYTES, ValueKind::Text).with_rule(ValueRule::Integer),
    ]
}

/// Whether a raw value is a "not filled in" marker such as `(missing)` or `TBD`
pub fn is_placeholder(raw: &str) -> bool {
    let value = raw
        .trim()
        .trim_start_matches(['(', '[', '<'])
        .trim_end_matches([')', ']', '>'])
        .trim();
    value.is_empty() || PLACEHOLDERS.iter().any(|p| value.eq_ignore_ascii_case(p))
}
