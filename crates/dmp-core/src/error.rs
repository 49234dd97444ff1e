//! Unified error model
//!
//! Every fatal condition of an archiving run maps to one variant. Validator
//! findings are not errors: they travel as a [`ValidationReport`] and only
//! become [`ArchiveError::ValidationFailed`] when the orchestrator refuses to
//! continue.
use std::path::PathBuf;
use thiserror::Error;

use crate::data_model::ValidationReport;

pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("README/MISSING: no README found at {}", .path.display())]
    MissingReadme { path: PathBuf },

    #[error("README/UNREADABLE: {}: {reason}", .path.display())]
    UnreadableReadme { path: PathBuf, reason: String },

    #[error("VALIDATE/INVALID: {}", .report.summary())]
    ValidationFailed { report: Box<ValidationReport> },

    #[error("GUARD/ARCHIVED: {} already records archive {checksum}", .readme.display())]
    AlreadyArchived { readme: PathBuf, checksum: String },

    #[error("PLAN/{}: {reason}", .path.display())]
    Planning { path: PathBuf, reason: String },

    #[error("ARCHIVE/WRITE: {}: {reason}", .path.display())]
    ArchiveWrite { path: PathBuf, reason: String },

    #[error("ARCHIVE/VERIFY: {} mismatched entries: {}", .mismatched.len(), .mismatched.join(", "))]
    Verification { mismatched: Vec<String> },

    #[error("ARCHIVE/PARTIAL: artifact kept at {}, directory needs manual review: {reason}", .artifact.display())]
    PartialArchive { artifact: PathBuf, reason: String },

    #[error("LOCK/BUSY: {} exists, another run may be in progress", .lock.display())]
    ConcurrentRun { lock: PathBuf },

    #[error("RUN/CANCELLED: {0}")]
    Cancelled(String),

    #[error("CONFIG/{0}")]
    Config(String),
}

impl ArchiveError {
    /// The validation report carried by a refused run, if any
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::ValidationFailed { report } => Some(&**report),
            _ => None,
        }
    }

    /// Whether the directory may have been left half-committed
    pub fn needs_manual_review(&self) -> bool {
        matches!(self, Self::PartialArchive { .. })
    }

    /// Planning failure for `path`
    pub fn plan(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Planning {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
