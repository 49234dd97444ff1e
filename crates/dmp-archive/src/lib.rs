//! DMP Archive: validate a directory's README, then archive the directory.
//!
//! ```text
//! locate README ─▶ parse ─▶ sentinel guard ─▶ validate ─▶ lock ─▶ plan ─▶ archive
//!                                                 │
//!                                      ValidationFailed (nothing touched)
//! ```
//!
//! A successful run leaves exactly one file of the original tree behind:
//! the README, with an archive summary block appended.
//!
//! ```no_run
//! use dmp_archive::{archive, ArchiveConfig, ArchiveOptions, DEFAULT_SCHEMA};
//! use std::path::Path;
//!
//! let outcome = archive(
//!     Path::new("/data/study-a"),
//!     &DEFAULT_SCHEMA,
//!     &ArchiveConfig::default(),
//!     &ArchiveOptions::new().dry_run(),
//! )?;
//! println!("{}", outcome.to_json_pretty()?);
//! # Ok::<(), dmp_archive::ArchiveError>(())
//! ```

pub mod changelog;
pub mod edit;
pub mod runner;

pub use changelog::{log_change, log_change_at};
pub use edit::{init_readme, set_fields};
pub use runner::{archive, ArchiveOutcome, ArchiveRunner};

pub use dmp_core::{
    ArchiveConfig, ArchiveError, ArchiveOptions, ArchiveResult, CancelToken, FieldSchema,
    Manifest, Result, ValidationReport, DEFAULT_SCHEMA,
};
pub use dmp_pack::{ArchiveState, CommitStep, TransitionHook};
pub use dmp_readme::{inspect, FileStat, Inspection};
