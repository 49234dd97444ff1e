//! Run configuration and per-invocation options
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ArchiveError, Result};

/// Static configuration, usually loaded from YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// README location relative to the archived directory
    pub readme: PathBuf,
    /// Fall back to the first `README*` file when `readme` is absent
    pub discover_readme: bool,
    /// Artifact directory; defaults to the archived directory's parent
    pub destination: Option<PathBuf>,
    /// Extra exclusion globs (`*`, `?`, `**`)
    pub exclude: Vec<String>,
    /// Advisory lock marker created inside the archived directory
    pub lock_file: String,
    /// gzip level, 0..=9
    pub compression_level: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            readme: PathBuf::from("README.md"),
            discover_readme: true,
            destination: None,
            exclude: Vec::new(),
            lock_file: ".dmp-archive.lock".to_string(),
            compression_level: 6,
        }
    }
}

impl ArchiveConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ArchiveError::Config(format!("failed to read config {}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ArchiveError::Config(format!("failed to parse config YAML: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn with_readme(mut self, readme: impl Into<PathBuf>) -> Self {
        self.readme = readme.into();
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level.min(9)
    }

    fn check(&self) -> Result<()> {
        if self.readme.as_os_str().is_empty() || self.readme.is_absolute() {
            return Err(ArchiveError::Config(format!(
                "readme must be a relative path, got {:?}",
                self.readme
            )));
        }
        if self.lock_file.is_empty() || self.lock_file.contains(['/', '\\']) {
            return Err(ArchiveError::Config(format!(
                "lock_file must be a plain file name, got {:?}",
                self.lock_file
            )));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag, honoured until Writing starts
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation switches
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Archive despite an existing archive marker or failed validation
    pub force: bool,
    /// Parse, validate and plan only
    pub dry_run: bool,
    pub cancel: CancelToken,
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}
