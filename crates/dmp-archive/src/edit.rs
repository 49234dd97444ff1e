//! README authoring: create a README with the schema's fields, or rewrite
//! field values in an existing one. Both refuse while an archive run holds
//! the lock marker and both write through a temp file.
use dmp_core::atomic::{create_file, replace_file};
use dmp_core::{ArchiveConfig, ArchiveError, ExtractedField, FieldSchema, Result, ValidationReport};
use dmp_pack::is_locked;
use dmp_readme::{locate_readme, parse_readme, read_readme_text, render_fields, update_fields, validate};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Create `<directory>/<config.readme>` holding `values`.
///
/// Values are rendered in schema order. The README must not exist yet and
/// the values must satisfy the schema; nothing is written otherwise.
pub fn init_readme(
    directory: &Path,
    values: &[(&str, &str)],
    schema: &FieldSchema,
    config: &ArchiveConfig,
) -> Result<PathBuf> {
    if !directory.is_dir() {
        return Err(ArchiveError::Config(format!(
            "{} is not a directory",
            directory.display()
        )));
    }
    ensure_unlocked(directory, config)?;
    if let Ok(existing) = locate_readme(directory, config) {
        if existing.path.exists() {
            return Err(ArchiveError::Config(format!(
                "README already exists at {}",
                existing.path.display()
            )));
        }
    }

    let updates = resolve_updates(values, schema)?;
    let mut fields: Vec<ExtractedField> = Vec::new();
    for def in schema.fields() {
        if let Some(update) = updates.iter().find(|u| u.name == def.name) {
            fields.push(update.clone());
        }
    }

    let report = validate(schema, &fields);
    if !report.is_valid() {
        return Err(ArchiveError::ValidationFailed {
            report: Box::new(report),
        });
    }

    let path = directory.join(&config.readme);
    let text = format!("{}\n", render_fields(&fields).trim_end());
    create_file(&path, text.as_bytes()).map_err(|e| {
        if e.kind() == ErrorKind::AlreadyExists {
            ArchiveError::Config(format!("README already exists at {}", path.display()))
        } else {
            write_error(&path, e)
        }
    })?;

    tracing::info!(readme = %path.display(), fields = fields.len(), "created README");
    Ok(path)
}

/// Set field values in the directory's README, in place where the field
/// already exists. Returns the validation report of the rewritten README.
pub fn set_fields(
    directory: &Path,
    values: &[(&str, &str)],
    schema: &FieldSchema,
    config: &ArchiveConfig,
) -> Result<ValidationReport> {
    ensure_unlocked(directory, config)?;
    let updates = resolve_updates(values, schema)?;

    let location = locate_readme(directory, config)?;
    let text = read_readme_text(&location.path)?;
    let parsed = parse_readme(&text, schema)?;
    let updated = update_fields(&text, &parsed, &updates);
    replace_file(&location.path, updated.as_bytes()).map_err(|e| write_error(&location.path, e))?;

    let report = validate(schema, &parse_readme(&updated, schema)?.fields);
    tracing::info!(
        readme = %location.path.display(),
        fields = updates.len(),
        valid = report.is_valid(),
        "updated README fields"
    );
    Ok(report)
}

/// Map `(label, value)` pairs onto schema fields by canonical name or alias
fn resolve_updates(values: &[(&str, &str)], schema: &FieldSchema) -> Result<Vec<ExtractedField>> {
    let mut updates: Vec<ExtractedField> = Vec::new();
    for (label, value) in values {
        let def = schema
            .fields()
            .iter()
            .find(|def| def.labels().any(|l| l.eq_ignore_ascii_case(label.trim())))
            .ok_or_else(|| ArchiveError::Config(format!("unknown field {:?}", label)))?;
        if def.sentinel {
            return Err(ArchiveError::Config(format!(
                "{} is written by the archiver only",
                def.name
            )));
        }
        let value = value.trim();
        if value.is_empty() || value.contains(['\n', '\r']) {
            return Err(ArchiveError::Config(format!(
                "value for {} must be a single non-empty line",
                def.name
            )));
        }
        updates.retain(|u| u.name != def.name);
        updates.push(ExtractedField::new(def.name.clone(), value, 0));
    }
    Ok(updates)
}

pub(crate) fn ensure_unlocked(directory: &Path, config: &ArchiveConfig) -> Result<()> {
    if is_locked(directory, &config.lock_file) {
        return Err(ArchiveError::ConcurrentRun {
            lock: directory.join(&config.lock_file),
        });
    }
    Ok(())
}

pub(crate) fn write_error(path: &Path, e: std::io::Error) -> ArchiveError {
    ArchiveError::ArchiveWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
