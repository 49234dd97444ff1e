//! Archive runner: one invocation from README to committed artifact
use chrono::Utc;
use dmp_core::schema::is_placeholder;
use dmp_core::{
    ArchiveConfig, ArchiveError, ArchiveOptions, ArchiveResult, FieldSchema, Manifest, Result,
    ValidationReport,
};
use dmp_pack::{
    is_locked, plan, relative_path, ArchiveRequest, Archiver, ExclusionSet, LockGuard, NoHook,
    TransitionHook,
};
use dmp_readme::{duplicate_warnings, locate_readme, validate, ParsedReadme, ReadmeDocument};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a run found and, unless it was a dry run, what it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOutcome {
    pub readme_path: PathBuf,
    pub report: ValidationReport,
    pub manifest: Manifest,
    /// `None` for dry runs
    pub result: Option<ArchiveResult>,
    pub warnings: Vec<String>,
}

impl ArchiveOutcome {
    pub fn is_dry_run(&self) -> bool {
        self.result.is_none()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ArchiveError::Config(format!("cannot serialize outcome: {}", e)))
    }
}

pub struct ArchiveRunner<'a> {
    schema: &'a FieldSchema,
    config: &'a ArchiveConfig,
}

impl<'a> ArchiveRunner<'a> {
    pub fn new(schema: &'a FieldSchema, config: &'a ArchiveConfig) -> Self {
        Self { schema, config }
    }

    pub fn run(&self, directory: &Path, options: &ArchiveOptions) -> Result<ArchiveOutcome> {
        self.run_with_hook(directory, options, NoHook)
    }

    /// Same as [`run`](Self::run) with a hook observing the archiver
    pub fn run_with_hook<H: TransitionHook>(
        &self,
        directory: &Path,
        options: &ArchiveOptions,
        hook: H,
    ) -> Result<ArchiveOutcome> {
        let root = open_root(directory)?;
        tracing::info!(
            directory = %root.display(),
            dry_run = options.dry_run,
            force = options.force,
            "archive run started"
        );

        let location = locate_readme(&root, self.config)?;
        let doc = ReadmeDocument::load(&location.path, self.schema)?;
        let mut warnings = location.warnings;
        warnings.extend(duplicate_warnings(&doc.parsed));

        if let Some((field, checksum)) = sentinel(self.schema, &doc.parsed) {
            if !options.force {
                tracing::warn!(readme = %doc.path.display(), %checksum, "README already records an archive");
                return Err(ArchiveError::AlreadyArchived {
                    readme: doc.path,
                    checksum,
                });
            }
            let note = format!("re-archiving although {} is {}", field, checksum);
            tracing::warn!("{}", note);
            warnings.push(note);
        }

        let report = validate(self.schema, &doc.parsed.fields);
        if !report.is_valid() {
            if !options.force {
                tracing::warn!(readme = %doc.path.display(), problems = %report.summary(), "README failed validation");
                return Err(ArchiveError::ValidationFailed {
                    report: Box::new(report),
                });
            }
            let note = format!("archiving despite invalid metadata: {}", report.summary());
            tracing::warn!("{}", note);
            warnings.push(note);
        }
        check_cancel(options, "before planning")?;

        let destination = self.destination(&root)?;
        let readme_rel = relative_path(&root, &doc.path).ok_or_else(|| {
            ArchiveError::Config(format!(
                "README {} is not inside {}",
                doc.path.display(),
                root.display()
            ))
        })?;
        let exclusions = ExclusionSet::new()
            .exact(readme_rel)
            .exact(self.config.lock_file.clone())
            .patterns(&self.config.exclude)?;

        if options.dry_run {
            if is_locked(&root, &self.config.lock_file) {
                return Err(ArchiveError::ConcurrentRun {
                    lock: root.join(&self.config.lock_file),
                });
            }
            let manifest = plan(&root, &exclusions)?;
            tracing::info!(entries = manifest.len(), total_bytes = manifest.total_bytes(), "dry run planned");
            return Ok(ArchiveOutcome {
                readme_path: doc.path,
                report,
                manifest,
                result: None,
                warnings,
            });
        }

        // Dropping the guard on any early return removes the marker.
        let lock = LockGuard::acquire(&root, &self.config.lock_file)?;
        let manifest = plan(&root, &exclusions)?;
        check_cancel(options, "before writing")?;

        let request = ArchiveRequest {
            destination,
            archived_at: Utc::now(),
            readme_path: doc.path.clone(),
            readme_text: doc.text,
            compression_level: self.config.compression_level(),
        };
        let run = Archiver::new(&manifest, request).with_hook(hook).run();

        let result = match run {
            Ok(result) => {
                lock.release();
                result
            }
            Err(e) if e.needs_manual_review() => {
                lock.keep();
                return Err(e);
            }
            Err(e) => {
                lock.release();
                return Err(e);
            }
        };

        tracing::info!(
            directory = %root.display(),
            artifact = %result.artifact_path.display(),
            "archive run finished"
        );
        Ok(ArchiveOutcome {
            readme_path: doc.path,
            report,
            manifest,
            result: Some(result),
            warnings,
        })
    }

    /// Configured destination, or the parent of `root`; never inside `root`
    fn destination(&self, root: &Path) -> Result<PathBuf> {
        let candidate = match &self.config.destination {
            Some(dest) if dest.is_absolute() => dest.clone(),
            Some(dest) => root.parent().unwrap_or(root).join(dest),
            None => root
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| ArchiveError::Config(format!("{} has no parent directory", root.display())))?,
        };
        let dest = candidate.canonicalize().map_err(|e| {
            ArchiveError::Config(format!("destination {}: {}", candidate.display(), e))
        })?;
        if !dest.is_dir() {
            return Err(ArchiveError::Config(format!(
                "destination {} is not a directory",
                dest.display()
            )));
        }
        if dest.starts_with(root) {
            return Err(ArchiveError::Config(format!(
                "destination {} is inside the archived directory {}",
                dest.display(),
                root.display()
            )));
        }
        Ok(dest)
    }
}

/// Run one archive invocation with a borrowed schema and config
pub fn archive(
    directory: &Path,
    schema: &FieldSchema,
    config: &ArchiveConfig,
    options: &ArchiveOptions,
) -> Result<ArchiveOutcome> {
    ArchiveRunner::new(schema, config).run(directory, options)
}

fn open_root(directory: &Path) -> Result<PathBuf> {
    let root = directory
        .canonicalize()
        .map_err(|e| ArchiveError::plan(directory, e))?;
    if !root.is_dir() {
        return Err(ArchiveError::plan(root, "not a directory"));
    }
    Ok(root)
}

/// First sentinel field carrying a real value
fn sentinel(schema: &FieldSchema, parsed: &ParsedReadme) -> Option<(String, String)> {
    schema.sentinels().find_map(|def| {
        parsed
            .get(&def.name)
            .filter(|f| !is_placeholder(&f.raw_value))
            .map(|f| (def.name.clone(), f.raw_value.clone()))
    })
}

fn check_cancel(options: &ArchiveOptions, stage: &str) -> Result<()> {
    if options.cancel.is_cancelled() {
        tracing::info!(stage, "archive run cancelled");
        return Err(ArchiveError::Cancelled(format!("cancelled {}", stage)));
    }
    Ok(())
}
