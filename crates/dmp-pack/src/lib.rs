//! DMP Pack: plan, write and verify a directory archive.
//!
//! ```text
//! plan(root, exclusions) ──▶ Manifest ──▶ Archiver::run ──▶ ArchiveResult
//!                                            │
//!                           Writing ─▶ Verifying ─▶ commit
//! ```
//!
//! The planner never modifies anything. The archiver only deletes originals
//! after the artifact has been re-read and matched against the manifest.

pub mod archiver;
pub mod exclude;
pub mod lock;
pub mod planner;

pub use archiver::{
    artifact_name, partial_path, ArchiveRequest, ArchiveState, Archiver, CommitStep, NoHook,
    TransitionHook,
};
pub use exclude::ExclusionSet;
pub use lock::{is_locked, LockGuard};
pub use planner::{plan, relative_path};
