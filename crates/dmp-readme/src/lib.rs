//! DMP README: locate, parse, validate and render README metadata.
//!
//! This is the read-only half of the system. A terminal viewer only needs
//! [`inspect`]; the orchestrator uses [`locate_readme`] and
//! [`ReadmeDocument::load`] before planning an archive.
//!
//! # Example
//!
//! ```
//! use dmp_core::FieldSchema;
//! use dmp_readme::{parse_readme, validate};
//!
//! let schema = FieldSchema::dmp_default();
//! let parsed = parse_readme("Owner: J. Smith\nDate: 2024-05-01\n", &schema).unwrap();
//! let report = validate(&schema, &parsed.fields);
//!
//! assert_eq!(parsed.value("Owner"), Some("J. Smith"));
//! assert!(report.missing_required().contains("Desc"));
//! ```

pub mod grammar;
pub mod parser;
pub mod render;
pub mod validator;

pub use grammar::LabelTable;
pub use parser::{parse_readme, DuplicateField, ParsedReadme, ReadmeParser};
pub use render::{append_log_entry, log_line, render_field, render_fields, update_fields};
pub use validator::validate;

use chrono::{DateTime, Utc};
use dmp_core::{ArchiveConfig, ArchiveError, FieldSchema, Result, ValidationReport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where the README was found and anything odd about finding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadmeLocation {
    pub path: PathBuf,
    pub warnings: Vec<String>,
}

/// Resolve the README of `dir`.
///
/// The configured path wins. Otherwise, with discovery on, the first
/// `README*` file (by name) is used.
pub fn locate_readme(dir: &Path, config: &ArchiveConfig) -> Result<ReadmeLocation> {
    let configured = dir.join(&config.readme);
    if configured.exists() || !config.discover_readme {
        return Ok(ReadmeLocation {
            path: configured,
            warnings: Vec::new(),
        });
    }

    let entries = fs::read_dir(dir).map_err(|e| ArchiveError::UnreadableReadme {
        path: dir.to_path_buf(),
        reason: format!("cannot list directory: {}", e),
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_uppercase()
                .starts_with("README")
        })
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    let mut warnings = Vec::new();
    let path = match candidates.len() {
        0 => return Err(ArchiveError::MissingReadme { path: configured }),
        1 => candidates.remove(0),
        n => {
            let chosen = candidates.remove(0);
            warnings.push(format!(
                "{} README candidates in {}, using {}",
                n,
                dir.display(),
                chosen.display()
            ));
            chosen
        }
    };

    tracing::debug!(readme = %path.display(), "discovered README");
    Ok(ReadmeLocation { path, warnings })
}

/// README text plus its parsed fields
#[derive(Debug, Clone)]
pub struct ReadmeDocument {
    pub path: PathBuf,
    pub text: String,
    pub parsed: ParsedReadme,
}

impl ReadmeDocument {
    /// Read and parse. A missing file and an unreadable one are distinct
    /// errors; neither is reported as "no fields".
    pub fn load(path: &Path, schema: &FieldSchema) -> Result<Self> {
        let text = read_readme_text(path)?;
        let parsed = parse_readme(&text, schema)?;
        tracing::debug!(
            readme = %path.display(),
            fields = parsed.fields.len(),
            unrecognized = parsed.unrecognized_lines,
            "parsed README"
        );
        Ok(Self {
            path: path.to_path_buf(),
            text,
            parsed,
        })
    }
}

pub fn read_readme_text(path: &Path) -> Result<String> {
    let unreadable = |reason: String| ArchiveError::UnreadableReadme {
        path: path.to_path_buf(),
        reason,
    };

    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ArchiveError::MissingReadme {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(unreadable(e.to_string())),
    };
    if !meta.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }

    let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| unreadable(format!("not valid UTF-8: {}", e)))
}

/// Read-only view of a directory's DMP metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub readme_path: PathBuf,
    /// `ls -l` style mode string of the README
    pub permissions: String,
    pub stat: FileStat,
    pub parsed: ParsedReadme,
    pub report: ValidationReport,
    pub warnings: Vec<String>,
}

/// Parse and validate without touching anything
pub fn inspect(dir: &Path, schema: &FieldSchema, config: &ArchiveConfig) -> Result<Inspection> {
    let location = locate_readme(dir, config)?;
    let doc = ReadmeDocument::load(&location.path, schema)?;
    let report = validate(schema, &doc.parsed.fields);

    let mut warnings = location.warnings;
    warnings.extend(duplicate_warnings(&doc.parsed));

    Ok(Inspection {
        permissions: permissions_string(&doc.path),
        stat: file_stat(&doc.path),
        readme_path: doc.path,
        parsed: doc.parsed,
        report,
        warnings,
    })
}

/// Ownership and timestamps of a file; fields the platform cannot report are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub owner_uid: Option<u32>,
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    /// Status change time (unix `ctime`)
    pub changed: Option<DateTime<Utc>>,
}

pub fn file_stat(path: &Path) -> FileStat {
    let Ok(meta) = fs::metadata(path) else {
        return FileStat::default();
    };
    FileStat {
        owner_uid: owner_uid(&meta),
        accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
        changed: changed_time(&meta),
    }
}

#[cfg(unix)]
fn owner_uid(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.uid())
}

#[cfg(not(unix))]
fn owner_uid(_meta: &fs::Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn changed_time(meta: &fs::Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;
    DateTime::from_timestamp(meta.ctime(), meta.ctime_nsec().clamp(0, 999_999_999) as u32)
}

#[cfg(not(unix))]
fn changed_time(_meta: &fs::Metadata) -> Option<DateTime<Utc>> {
    None
}

/// Human readable notes for every overridden duplicate label
pub fn duplicate_warnings(parsed: &ParsedReadme) -> Vec<String> {
    parsed
        .duplicates
        .iter()
        .map(|d| {
            format!(
                "field {} repeated: line {} overrides line {}",
                d.name, d.kept_line, d.dropped_line
            )
        })
        .collect()
}

#[cfg(unix)]
pub fn permissions_string(path: &Path) -> String {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = fs::symlink_metadata(path) else {
        return "?---------".to_string();
    };
    let mode = meta.permissions().mode();
    let kind = if meta.is_dir() {
        'd'
    } else if meta.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for (bit, ch) in [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ] {
        out.push(if mode & bit != 0 { ch } else { '-' });
    }
    out
}

#[cfg(not(unix))]
pub fn permissions_string(path: &Path) -> String {
    match fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => "-r--r--r--".to_string(),
        Ok(_) => "-rw-rw-rw-".to_string(),
        Err(_) => "?---------".to_string(),
    }
}
