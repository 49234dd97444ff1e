//! Data Model: ExtractedField, ValidationReport, Manifest, ArchiveResult
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::schema::{
    ARCHIVED_AT, ARCHIVE_CHECKSUM, ARCHIVE_PATH, ENTRY_COUNT, SUMMARY_BEGIN, SUMMARY_END,
    TOTAL_BYTES,
};

/// A recognized field found in a README
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Canonical field name from the schema (not the label as written)
    pub name: String,
    /// Value with continuation lines joined by single spaces
    pub raw_value: String,
    /// 1-based line of the field label
    pub line_number: usize,
}

impl ExtractedField {
    pub fn new(name: impl Into<String>, raw_value: impl Into<String>, line_number: usize) -> Self {
        Self {
            name: name.into(),
            raw_value: raw_value.into(),
            line_number,
        }
    }
}

/// Outcome of checking extracted fields against the schema.
///
/// Built once by the validator; the collections are ordered so two reports
/// over the same input serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    missing_required: BTreeSet<String>,
    malformed: BTreeMap<String, String>,
    is_valid: bool,
}

impl ValidationReport {
    pub fn new(missing_required: BTreeSet<String>, malformed: BTreeMap<String, String>) -> Self {
        let is_valid = missing_required.is_empty() && malformed.is_empty();
        Self {
            missing_required,
            malformed,
            is_valid,
        }
    }

    pub fn missing_required(&self) -> &BTreeSet<String> {
        &self.missing_required
    }

    /// Field name → human readable reason
    pub fn malformed(&self) -> &BTreeMap<String, String> {
        &self.malformed
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// One-line description, e.g. `missing [Owner]; malformed [Date: ...]`
    pub fn summary(&self) -> String {
        if self.is_valid {
            return "all fields valid".to_string();
        }

        let mut parts = Vec::new();
        if !self.missing_required.is_empty() {
            let names: Vec<&str> = self.missing_required.iter().map(String::as_str).collect();
            parts.push(format!("missing [{}]", names.join(", ")));
        }
        if !self.malformed.is_empty() {
            let reasons: Vec<String> = self
                .malformed
                .iter()
                .map(|(name, reason)| format!("{}: {}", name, reason))
                .collect();
            parts.push(format!("malformed [{}]", reasons.join("; ")));
        }
        parts.join("; ")
    }
}

/// What a manifest entry stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    File,
    /// Recorded as a link, never followed
    Symlink { target: String },
    /// Directory with no eligible descendants, kept so structure can be rebuilt
    EmptyDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path below the archived root, `/`-separated
    pub relative_path: String,
    pub size_bytes: u64,
    /// `blake3:<hex>` of the content (files) or link target (symlinks)
    pub checksum: Option<String>,
    pub kind: EntryKind,
}

impl ManifestEntry {
    pub fn file(relative_path: impl Into<String>, size_bytes: u64, checksum: String) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes,
            checksum: Some(checksum),
            kind: EntryKind::File,
        }
    }

    pub fn symlink(relative_path: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            relative_path: relative_path.into(),
            size_bytes: 0,
            checksum: Some(crate::hashing::hash_bytes(target.as_bytes())),
            kind: EntryKind::Symlink { target },
        }
    }

    pub fn empty_directory(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes: 0,
            checksum: None,
            kind: EntryKind::EmptyDirectory,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::EmptyDirectory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }
}

/// Ordered list of everything slated for archiving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    root: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Entries are stably sorted by relative path
    pub fn new(root: impl Into<PathBuf>, mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Self {
            root: root.into(),
            entries,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_file()).count()
    }

    pub fn get(&self, relative_path: &str) -> Option<&ManifestEntry> {
        self.entries
            .binary_search_by(|e| e.relative_path.as_str().cmp(relative_path))
            .ok()
            .map(|idx| &self.entries[idx])
    }
}

/// Produced once per successful archiving run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub artifact_path: PathBuf,
    pub artifact_checksum: String,
    pub entry_count: usize,
    pub total_bytes: u64,
    pub retained_readme_path: PathBuf,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveResult {
    /// Delimited block appended to the retained README
    pub fn summary_block(&self) -> String {
        let mut out = String::new();
        out.push_str(SUMMARY_BEGIN);
        out.push('\n');
        let lines = [
            (
                ARCHIVED_AT,
                self.archived_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (ARCHIVE_CHECKSUM, self.artifact_checksum.clone()),
            (ARCHIVE_PATH, self.artifact_path.display().to_string()),
            (ENTRY_COUNT, self.entry_count.to_string()),
            (TOTAL_BYTES, self.total_bytes.to_string()),
        ];
        for (label, value) in lines {
            out.push_str(label);
            out.push_str(": ");
            out.push_str(&value);
            out.push('\n');
        }
        out.push_str(SUMMARY_END);
        out.push('\n');
        out
    }

    /// README text with the summary block appended after a blank line
    pub fn annotate(&self, original: &str) -> String {
        let mut out = original.trim_end_matches(['\n', '\r']).to_string();
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&self.summary_block());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_result() -> ArchiveResult {
        ArchiveResult {
            artifact_path: PathBuf::from("/data/proj-20261018T120000Z.tar.gz"),
            artifact_checksum: format!("blake3:{}", "a".repeat(64)),
            entry_count: 2,
            total_bytes: 150,
            retained_readme_path: PathBuf::from("/data/proj/README.md"),
            archived_at: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_report_validity_is_derived() {
        let report = ValidationReport::new(BTreeSet::new(), BTreeMap::new());
        assert!(report.is_valid());
        assert_eq!(report.summary(), "all fields valid");

        let mut missing = BTreeSet::new();
        missing.insert("Owner".to_string());
        let report = ValidationReport::new(missing, BTreeMap::new());
        assert!(!report.is_valid());
        assert_eq!(report.summary(), "missing [Owner]");
    }

    #[test]
    fn test_manifest_sorted_and_totals() {
        let manifest = Manifest::new(
            "/tmp/proj",
            vec![
                ManifestEntry::file("notes.txt", 50, "blake3:n".to_string()),
                ManifestEntry::empty_directory("empty"),
                ManifestEntry::file("data.csv", 100, "blake3:d".to_string()),
            ],
        );

        let paths: Vec<&str> = manifest.entries().iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["data.csv", "empty", "notes.txt"]);
        assert_eq!(manifest.total_bytes(), 150);
        assert_eq!(manifest.file_count(), 2);
        assert!(manifest.get("empty").unwrap().is_directory());
        assert!(manifest.get("missing").is_none());
    }

    #[test]
    fn test_summary_block_layout() {
        let block = sample_result().summary_block();
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.first(), Some(&SUMMARY_BEGIN));
        assert_eq!(lines.last(), Some(&SUMMARY_END));
        assert!(block.contains("Archived-At: 2026-10-18T12:00:00Z\n"));
        assert!(block.contains("Entry-Count: 2\n"));
        assert!(block.contains("Total-Bytes: 150\n"));
    }

    #[test]
    fn test_annotate_keeps_original_text() {
        let original = "Title: Study A\nOwner: J. Smith\n\n\n";
        let annotated = sample_result().annotate(original);
        assert!(annotated.starts_with("Title: Study A\nOwner: J. Smith\n\n<!-- dmp-archive:begin -->"));
        assert!(annotated.ends_with("<!-- dmp-archive:end -->\n"));
    }
}
