//! DMP Core: field schema, data model, errors and content hashing
//!
//! Shared vocabulary for the archiving pipeline. The README parser, the
//! planner/archiver and the orchestrator all speak in these types.
//!
//! ```text
//! README ──▶ ExtractedField* ──▶ ValidationReport
//!                                     │
//! directory ──▶ Manifest ──▶ ArchiveResult (retained README + artifact)
//! ```

pub mod atomic;
pub mod config;
pub mod data_model;
pub mod error;
pub mod hashing;
pub mod schema;

pub use config::{ArchiveConfig, ArchiveOptions, CancelToken};
pub use data_model::{
    ArchiveResult, EntryKind, ExtractedField, Manifest, ManifestEntry, ValidationReport,
};
pub use error::{ArchiveError, Result};
pub use hashing::{hash_bytes, hash_file, HashingReader};
pub use schema::{FieldDefinition, FieldSchema, ValueKind, ValueRule, DEFAULT_SCHEMA};

/// Engine version, written into the lock marker
pub const DMP_ARCHIVE_VERSION: &str = env!("CARGO_PKG_VERSION");
