//! Advisory lock marker inside the directory being archived.
//!
//! Created with exclusive-create at planning start. Dropping the guard
//! removes it; [`LockGuard::keep`] leaves it behind so a half-committed
//! directory is not picked up by another automated run.
use chrono::{SecondsFormat, Utc};
use dmp_core::{ArchiveError, Result, DMP_ARCHIVE_VERSION};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    run_id: String,
    armed: bool,
}

impl LockGuard {
    pub fn acquire(dir: &Path, file_name: &str) -> Result<Self> {
        let path = dir.join(file_name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ArchiveError::ConcurrentRun { lock: path });
            }
            Err(e) => {
                return Err(ArchiveError::plan(&path, format!("cannot create lock marker: {}", e)));
            }
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        let body = format!(
            "run_id: {}\npid: {}\nstarted_at: {}\nversion: {}\n",
            run_id,
            std::process::id(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            DMP_ARCHIVE_VERSION,
        );
        let written = file.write_all(body.as_bytes()).and_then(|_| file.sync_all());
        let guard = Self {
            path,
            run_id,
            armed: true,
        };
        // Dropping `guard` on the error path removes the half-written marker.
        written.map_err(|e| ArchiveError::plan(&guard.path, format!("cannot write lock marker: {}", e)))?;

        tracing::debug!(lock = %guard.path.display(), run_id = %guard.run_id, "acquired lock marker");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Leave the marker in place for manual inspection
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        tracing::warn!(lock = %self.path.display(), "lock marker retained for manual review");
        self.path.clone()
    }

    /// Remove the marker now
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(lock = %self.path.display(), "released lock marker"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(lock = %self.path.display(), error = %e, "failed to remove lock marker"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

pub fn is_locked(dir: &Path, file_name: &str) -> bool {
    dir.join(file_name).exists()
}
