//! README change log
//!
//! Appends `YYYY-MM-DD HH:MM: description` to the README, replacing the file
//! through a temp file in the same directory so readers never see a torn
//! write. The README must carry every required field before it is touched.
use crate::edit::{ensure_unlocked, write_error};
use chrono::{DateTime, Utc};
use dmp_core::atomic::replace_file;
use dmp_core::{ArchiveConfig, ArchiveError, FieldSchema, Result, ValidationReport};
use dmp_readme::{append_log_entry, locate_readme, log_line, parse_readme, read_readme_text, validate};
use std::path::Path;

/// Append a change-log line stamped with the current time; returns the line
pub fn log_change(
    directory: &Path,
    description: &str,
    schema: &FieldSchema,
    config: &ArchiveConfig,
) -> Result<String> {
    log_change_at(directory, description, schema, config, Utc::now())
}

pub fn log_change_at(
    directory: &Path,
    description: &str,
    schema: &FieldSchema,
    config: &ArchiveConfig,
    at: DateTime<Utc>,
) -> Result<String> {
    let description = description.trim();
    if description.is_empty() || description.contains('\n') {
        return Err(ArchiveError::Config(
            "change description must be a single non-empty line".to_string(),
        ));
    }
    ensure_unlocked(directory, config)?;

    let location = locate_readme(directory, config)?;
    let text = read_readme_text(&location.path)?;

    // Only presence is checked; malformed values do not block a log entry.
    let report = validate(schema, &parse_readme(&text, schema)?.fields);
    if !report.missing_required().is_empty() {
        tracing::warn!(
            readme = %location.path.display(),
            missing = ?report.missing_required(),
            "refusing to log change on README without required fields"
        );
        let missing = ValidationReport::new(report.missing_required().clone(), Default::default());
        return Err(ArchiveError::ValidationFailed {
            report: Box::new(missing),
        });
    }

    let updated = append_log_entry(&text, at, description);
    replace_file(&location.path, updated.as_bytes()).map_err(|e| write_error(&location.path, e))?;

    let line = log_line(at, description);
    tracing::info!(readme = %location.path.display(), entry = %line, "logged README change");
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dmp_core::{FieldDefinition, ValueKind};
    use std::fs;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![FieldDefinition::new("Owner", ValueKind::Person).required()]).unwrap()
    }

    #[test]
    fn test_appends_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "Owner: J. Smith").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 0).unwrap();

        let line = log_change_at(dir.path(), "  moved raw data  ", &schema(), &ArchiveConfig::default(), at)
            .unwrap();
        assert_eq!(line, "2026-10-18 14:05: moved raw data");
        assert_eq!(
            fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "Owner: J. Smith\n2026-10-18 14:05: moved raw data\n"
        );
    }

    #[test]
    fn test_rejects_multiline_description() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "Owner: J. Smith\n").unwrap();
        let err = log_change(dir.path(), "one\ntwo", &schema(), &ArchiveConfig::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::Config(_)));
    }

    #[test]
    fn test_missing_readme() {
        let dir = tempfile::tempdir().unwrap();
        let err = log_change(dir.path(), "note", &schema(), &ArchiveConfig::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingReadme { .. }));
    }

    #[test]
    fn test_refused_without_required_fields() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.md");
        fs::write(&readme, "Owner: TBD\n\nNotes.\n").unwrap();

        let err = log_change(dir.path(), "note", &schema(), &ArchiveConfig::default()).unwrap_err();
        let report = err.report().unwrap();
        assert!(report.missing_required().contains("Owner"));
        assert!(report.malformed().is_empty());
        assert_eq!(fs::read_to_string(&readme).unwrap(), "Owner: TBD\n\nNotes.\n");
    }

    #[test]
    fn test_malformed_value_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "Owner: 1234\n").unwrap();
        assert!(log_change(dir.path(), "note", &schema(), &ArchiveConfig::default()).is_ok());
    }

    #[test]
    fn test_refused_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "Owner: J. Smith\n").unwrap();
        fs::write(dir.path().join(".dmp-archive.lock"), "").unwrap();
        let err = log_change(dir.path(), "note", &schema(), &ArchiveConfig::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::ConcurrentRun { .. }));
    }
}
