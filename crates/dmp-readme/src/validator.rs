//! Metadata validator
//!
//! Never fails: missing and malformed fields are findings in the report.
use dmp_core::schema::is_placeholder;
use dmp_core::{ExtractedField, FieldSchema, ValidationReport};
use std::collections::{BTreeMap, BTreeSet};

pub fn validate(schema: &FieldSchema, fields: &[ExtractedField]) -> ValidationReport {
    let mut missing_required = BTreeSet::new();
    let mut malformed = BTreeMap::new();

    for def in schema.required() {
        let present = fields
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case(&def.name) && !is_placeholder(&f.raw_value));
        if !present {
            missing_required.insert(def.name.clone());
        }
    }

    for field in fields {
        if is_placeholder(&field.raw_value) {
            continue;
        }
        let Some(def) = schema.get(&field.name) else {
            continue;
        };
        if let Err(reason) = def.validate(&field.raw_value) {
            malformed.insert(def.name.clone(), format!("line {}: {}", field.line_number, reason));
        }
    }

    let report = ValidationReport::new(missing_required, malformed);
    tracing::debug!(valid = report.is_valid(), summary = %report.summary(), "validated README fields");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmp_core::schema::{FieldDefinition, ValueKind};

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDefinition::new("Title", ValueKind::Text).required(),
            FieldDefinition::new("Owner", ValueKind::Person).required(),
            FieldDefinition::new("Date", ValueKind::Date),
        ])
        .unwrap()
    }

    #[test]
    fn test_all_present() {
        let fields = vec![
            ExtractedField::new("Title", "Study A", 1),
            ExtractedField::new("Owner", "J. Smith", 2),
            ExtractedField::new("Date", "2024-01-31", 3),
        ];
        let report = validate(&schema(), &fields);
        assert!(report.is_valid());
    }

    #[test]
    fn test_placeholder_counts_as_missing() {
        let fields = vec![
            ExtractedField::new("Title", "Study A", 1),
            ExtractedField::new("Owner", "(missing)", 2),
        ];
        let report = validate(&schema(), &fields);

        assert!(!report.is_valid());
        assert_eq!(report.missing_required().iter().collect::<Vec<_>>(), vec!["Owner"]);
        assert!(report.malformed().is_empty());
    }

    #[test]
    fn test_malformed_reason_mentions_line() {
        let fields = vec![
            ExtractedField::new("Title", "Study A", 1),
            ExtractedField::new("Owner", "J. Smith", 2),
            ExtractedField::new("Date", "last tuesday", 7),
        ];
        let report = validate(&schema(), &fields);

        assert!(!report.is_valid());
        assert!(report.missing_required().is_empty());
        let reason = &report.malformed()["Date"];
        assert!(reason.starts_with("line 7:"), "reason: {}", reason);
    }

    #[test]
    fn test_optional_placeholder_ignored() {
        let fields = vec![
            ExtractedField::new("Title", "Study A", 1),
            ExtractedField::new("Owner", "J. Smith", 2),
            ExtractedField::new("Date", "TBD", 3),
        ];
        assert!(validate(&schema(), &fields).is_valid());
    }
}
