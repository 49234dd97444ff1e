//! Archiver: manifest → verified `.tar.gz` → retained README.
//!
//! ```text
//! Planned ──▶ Writing ──▶ Verifying ──▶ Committed
//!                │            │    └──▶ Partial   (commit step failed)
//!                └──▶ Failed ◀┘
//! ```
//!
//! Writing streams every entry through a hashing reader and compares it with
//! the manifest. Verifying refuses any mismatch and re-reads the finished
//! artifact. Commit publishes the artifact, stages the annotated README,
//! deletes the originals, then renames the README into place. A failure
//! once deletion has started is `Partial`: the artifact stays, nothing is
//! retried.
use chrono::{DateTime, Utc};
use dmp_core::atomic::stage_replacement;
use dmp_core::hashing::hash_reader;
use dmp_core::{
    hash_file, ArchiveError, ArchiveResult, EntryKind, HashingReader, Manifest, ManifestEntry,
    Result,
};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveState {
    Planned,
    Writing,
    Verifying,
    Committed,
    Failed,
    /// Commit started but did not finish; needs manual review
    Partial,
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ArchiveState::Planned => "planned",
            ArchiveState::Writing => "writing",
            ArchiveState::Verifying => "verifying",
            ArchiveState::Committed => "committed",
            ArchiveState::Failed => "failed",
            ArchiveState::Partial => "partial",
        };
        f.write_str(name)
    }
}

/// Ordered steps of the commit phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    /// Rename the partial artifact into place and checksum it
    PublishArtifact,
    /// Write the annotated README to a temp file
    StageReadme,
    DeleteOriginals,
    /// Rename the staged README over the original
    ReplaceReadme,
}

impl CommitStep {
    /// Whether the directory may already be modified when this step fails
    pub fn is_destructive(self) -> bool {
        matches!(self, CommitStep::DeleteOriginals | CommitStep::ReplaceReadme)
    }
}

/// Seam for failure injection: called when entering a non-terminal state
/// and before each commit step. An `Err` aborts the run at that point.
pub trait TransitionHook {
    fn on_enter(&mut self, _state: ArchiveState, _manifest: &Manifest) -> io::Result<()> {
        Ok(())
    }

    fn before_commit_step(&mut self, _step: CommitStep) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

impl TransitionHook for NoHook {}

/// Everything the archiver needs besides the manifest
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Directory that receives the artifact (must exist)
    pub destination: PathBuf,
    pub archived_at: DateTime<Utc>,
    pub readme_path: PathBuf,
    /// README content as read before planning
    pub readme_text: String,
    pub compression_level: u32,
}

impl ArchiveRequest {
    /// `<dirname>-<YYYYMMDDTHHMMSSZ>.tar.gz`
    pub fn artifact_name(&self, root: &Path) -> String {
        artifact_name(root, self.archived_at)
    }
}

pub fn artifact_name(root: &Path, at: DateTime<Utc>) -> String {
    let dir_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "archive".to_string());
    format!("{}-{}.tar.gz", dir_name, at.format("%Y%m%dT%H%M%SZ"))
}

pub struct Archiver<'m> {
    manifest: &'m Manifest,
    request: ArchiveRequest,
    hook: Box<dyn TransitionHook + 'm>,
    state: ArchiveState,
    history: Vec<ArchiveState>,
}

impl<'m> Archiver<'m> {
    pub fn new(manifest: &'m Manifest, request: ArchiveRequest) -> Self {
        Self {
            manifest,
            request,
            hook: Box::new(NoHook),
            state: ArchiveState::Planned,
            history: vec![ArchiveState::Planned],
        }
    }

    pub fn with_hook(mut self, hook: impl TransitionHook + 'm) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Every state visited, starting with `Planned`
    pub fn history(&self) -> &[ArchiveState] {
        &self.history
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.request
            .destination
            .join(self.request.artifact_name(self.manifest.root()))
    }

    /// Run the state machine once. A second call is refused.
    pub fn run(&mut self) -> Result<ArchiveResult> {
        if self.state != ArchiveState::Planned {
            return Err(ArchiveError::Config(format!(
                "archiver already ran (state: {})",
                self.state
            )));
        }

        let artifact = self.artifact_path();
        let partial = partial_path(&artifact);
        tracing::info!(
            root = %self.manifest.root().display(),
            artifact = %artifact.display(),
            entries = self.manifest.len(),
            "archiving directory"
        );

        if artifact.exists() || partial.exists() {
            self.state = ArchiveState::Failed;
            self.history.push(ArchiveState::Failed);
            return Err(ArchiveError::ArchiveWrite {
                path: artifact,
                reason: "artifact already exists".to_string(),
            });
        }

        self.enter(ArchiveState::Writing)
            .map_err(|e| write_error(&partial, e))
            .map_err(|e| self.fail(&partial, e))?;
        let mismatched = match self.write_artifact(&partial) {
            Ok(mismatched) => mismatched,
            Err(e) => return Err(self.fail(&partial, e)),
        };

        self.enter(ArchiveState::Verifying)
            .map_err(|e| write_error(&partial, e))
            .map_err(|e| self.fail(&partial, e))?;
        if !mismatched.is_empty() {
            return Err(self.fail(&partial, ArchiveError::Verification { mismatched }));
        }
        if let Err(e) = self.verify_artifact(&partial) {
            return Err(self.fail(&partial, e));
        }

        self.commit(&partial, &artifact)
    }

    fn enter(&mut self, state: ArchiveState) -> io::Result<()> {
        tracing::debug!(from = %self.state, to = %state, "archive state transition");
        self.hook.on_enter(state, self.manifest)?;
        self.state = state;
        self.history.push(state);
        Ok(())
    }

    fn fail(&mut self, partial: &Path, err: ArchiveError) -> ArchiveError {
        discard(partial);
        self.state = ArchiveState::Failed;
        self.history.push(ArchiveState::Failed);
        tracing::warn!(error = %err, "archiving failed, originals untouched");
        err
    }

    fn partial_failure(&mut self, artifact: &Path, step: CommitStep, reason: String) -> ArchiveError {
        self.state = ArchiveState::Partial;
        self.history.push(ArchiveState::Partial);
        let err = ArchiveError::PartialArchive {
            artifact: artifact.to_path_buf(),
            reason: format!("{:?}: {}", step, reason),
        };
        tracing::warn!(error = %err, "commit interrupted, directory left for manual review");
        err
    }

    /// Stream all entries; returns the paths that no longer match the manifest
    fn write_artifact(&self, partial: &Path) -> Result<Vec<String>> {
        let root = self.manifest.root();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(partial)
            .map_err(|e| write_error(partial, e))?;
        let encoder = GzEncoder::new(
            BufWriter::new(file),
            Compression::new(self.request.compression_level.min(9)),
        );
        let mut builder = tar::Builder::new(encoder);
        let mut mismatched = Vec::new();

        for entry in self.manifest.entries() {
            let source = root.join(&entry.relative_path);
            let ok = match &entry.kind {
                EntryKind::File => append_file(&mut builder, entry, &source)
                    .map_err(|e| write_error(&source, e))?,
                EntryKind::Symlink { target } => append_symlink(&mut builder, entry, target, &source)
                    .map_err(|e| write_error(&source, e))?,
                EntryKind::EmptyDirectory => append_dir(&mut builder, entry, &source)
                    .map_err(|e| write_error(&source, e))?,
            };
            if !ok {
                tracing::warn!(entry = %entry.relative_path, "entry changed since planning");
                mismatched.push(entry.relative_path.clone());
            }
        }

        let encoder = builder.into_inner().map_err(|e| write_error(partial, e))?;
        let writer = encoder.finish().map_err(|e| write_error(partial, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| write_error(partial, e.into_error()))?;
        file.sync_all().map_err(|e| write_error(partial, e))?;

        Ok(mismatched)
    }

    /// Decode the written artifact and compare every entry with the manifest
    fn verify_artifact(&self, partial: &Path) -> Result<()> {
        let file = File::open(partial).map_err(|e| write_error(partial, e))?;
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        let mut seen: HashMap<String, (EntryKind, Option<String>)> = HashMap::new();

        let entries = archive.entries().map_err(|e| write_error(partial, e))?;
        for item in entries {
            let mut item = item.map_err(|e| write_error(partial, e))?;
            let path = item
                .path()
                .map_err(|e| write_error(partial, e))?
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string();
            let entry_type = item.header().entry_type();

            let observed = if entry_type.is_dir() {
                (EntryKind::EmptyDirectory, None)
            } else if entry_type.is_symlink() {
                let target = item
                    .link_name()
                    .map_err(|e| write_error(partial, e))?
                    .map(|t| t.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let digest = dmp_core::hash_bytes(target.as_bytes());
                (EntryKind::Symlink { target }, Some(digest))
            } else {
                let (digest, _) = hash_reader(&mut item).map_err(|e| write_error(partial, e))?;
                (EntryKind::File, Some(digest))
            };
            seen.insert(path, observed);
        }

        let mut mismatched = BTreeSet::new();
        for entry in self.manifest.entries() {
            match seen.remove(&entry.relative_path) {
                Some((kind, checksum)) if kind == entry.kind && checksum == entry.checksum => {}
                _ => {
                    mismatched.insert(entry.relative_path.clone());
                }
            }
        }
        mismatched.extend(seen.into_keys());

        if mismatched.is_empty() {
            tracing::debug!(artifact = %partial.display(), "artifact verified");
            Ok(())
        } else {
            Err(ArchiveError::Verification {
                mismatched: mismatched.into_iter().collect(),
            })
        }
    }

    fn commit(&mut self, partial: &Path, artifact: &Path) -> Result<ArchiveResult> {
        // Nothing in the directory has changed until DeleteOriginals.
        if let Err(e) = self.hook.before_commit_step(CommitStep::PublishArtifact) {
            return Err(self.fail(partial, write_error(artifact, e)));
        }
        if let Err(e) = fs::rename(partial, artifact) {
            return Err(self.fail(partial, write_error(artifact, e)));
        }
        let artifact_checksum = match hash_file(artifact) {
            Ok((digest, _)) => digest,
            Err(e) => return Err(self.fail(artifact, write_error(artifact, e))),
        };

        let result = ArchiveResult {
            artifact_path: artifact.to_path_buf(),
            artifact_checksum,
            entry_count: self.manifest.len(),
            total_bytes: self.manifest.total_bytes(),
            retained_readme_path: self.request.readme_path.clone(),
            archived_at: self.request.archived_at,
        };

        let staged = self
            .hook
            .before_commit_step(CommitStep::StageReadme)
            .and_then(|_| {
                let annotated = result.annotate(&self.request.readme_text);
                stage_replacement(&self.request.readme_path, annotated.as_bytes())
            });
        let staged = match staged {
            Ok(staged) => staged,
            Err(e) => return Err(self.fail(artifact, write_error(&self.request.readme_path, e))),
        };

        if let Err(e) = self
            .hook
            .before_commit_step(CommitStep::DeleteOriginals)
            .and_then(|_| delete_originals(self.manifest))
        {
            return Err(self.partial_failure(artifact, CommitStep::DeleteOriginals, e.to_string()));
        }

        if let Err(e) = self.hook.before_commit_step(CommitStep::ReplaceReadme) {
            return Err(self.partial_failure(artifact, CommitStep::ReplaceReadme, e.to_string()));
        }
        if let Err(e) = staged.persist(&self.request.readme_path) {
            return Err(self.partial_failure(artifact, CommitStep::ReplaceReadme, e.error.to_string()));
        }

        self.state = ArchiveState::Committed;
        self.history.push(ArchiveState::Committed);
        tracing::info!(
            artifact = %result.artifact_path.display(),
            checksum = %result.artifact_checksum,
            entries = result.entry_count,
            total_bytes = result.total_bytes,
            "archive committed"
        );
        Ok(result)
    }
}

pub fn partial_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn write_error(path: &Path, e: impl ToString) -> ArchiveError {
    ArchiveError::ArchiveWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(artifact = %path.display(), "discarded artifact"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(artifact = %path.display(), error = %e, "failed to discard artifact"),
    }
}

fn header_for(meta: Option<&fs::Metadata>, entry_type: tar::EntryType, size: u64, default_mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(meta.map(mode_of).unwrap_or(default_mode));
    let mtime = meta
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    header.set_mtime(mtime);
    header
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Append a regular file; `Ok(false)` when its content no longer matches
fn append_file<W: Write>(builder: &mut tar::Builder<W>, entry: &ManifestEntry, source: &Path) -> io::Result<bool> {
    let file = match File::open(source) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let meta = file.metadata()?;
    let mut header = header_for(Some(&meta), tar::EntryType::Regular, entry.size_bytes, 0o644);

    let mut reader = HashingReader::new(file.take(entry.size_bytes));
    builder.append_data(&mut header, &entry.relative_path, &mut reader)?;
    let (limited, digest, count) = reader.into_parts();

    let mut file = limited.into_inner();
    let mut extra = [0u8; 1];
    let grew = file.read(&mut extra)? > 0;

    Ok(!grew && count == entry.size_bytes && Some(&digest) == entry.checksum.as_ref())
}

fn append_symlink<W: Write>(
    builder: &mut tar::Builder<W>,
    entry: &ManifestEntry,
    target: &str,
    source: &Path,
) -> io::Result<bool> {
    let current = match fs::read_link(source) {
        Ok(current) => current,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let meta = fs::symlink_metadata(source).ok();
    let mut header = header_for(meta.as_ref(), tar::EntryType::Symlink, 0, 0o777);
    builder.append_link(&mut header, &entry.relative_path, target)?;
    Ok(current.to_str() == Some(target))
}

fn append_dir<W: Write>(builder: &mut tar::Builder<W>, entry: &ManifestEntry, source: &Path) -> io::Result<bool> {
    let meta = match fs::symlink_metadata(source) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let mut header = header_for(Some(&meta), tar::EntryType::Directory, 0, 0o755);
    builder.append_data(&mut header, &entry.relative_path, io::empty())?;
    Ok(meta.is_dir())
}

/// Remove files and links covered by the manifest, then every directory
/// they lived in that is now empty, deepest first
fn delete_originals(manifest: &Manifest) -> io::Result<()> {
    let root = manifest.root();
    let mut dirs: BTreeSet<String> = BTreeSet::new();

    for entry in manifest.entries() {
        let mut parent = entry.relative_path.as_str();
        while let Some((dir, _)) = parent.rsplit_once('/') {
            dirs.insert(dir.to_string());
            parent = dir;
        }
        match entry.kind {
            EntryKind::EmptyDirectory => {
                dirs.insert(entry.relative_path.clone());
            }
            EntryKind::File | EntryKind::Symlink { .. } => {
                let path = root.join(&entry.relative_path);
                fs::remove_file(&path).map_err(|e| {
                    io::Error::new(e.kind(), format!("removing {}: {}", path.display(), e))
                })?;
            }
        }
    }

    let mut ordered: Vec<String> = dirs.into_iter().collect();
    ordered.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
    for dir in ordered {
        let path = root.join(&dir);
        let is_empty = match fs::read_dir(&path) {
            Ok(mut items) => items.next().is_none(),
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if is_empty {
            fs::remove_dir(&path).map_err(|e| {
                io::Error::new(e.kind(), format!("removing {}: {}", path.display(), e))
            })?;
        } else {
            tracing::debug!(dir = %dir, "directory still holds excluded files, kept");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclude::ExclusionSet;
    use crate::planner::plan;
    use chrono::TimeZone;

    struct Fixture {
        _parent: tempfile::TempDir,
        root: PathBuf,
        dest: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("proj");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("README.md"), "Title: Study A\nOwner: J. Smith\n").unwrap();
        fs::write(root.join("data.csv"), vec![b'd'; 100]).unwrap();
        fs::write(root.join("notes.txt"), vec![b'n'; 50]).unwrap();
        fs::create_dir_all(root.join("raw/empty")).unwrap();
        Fixture {
            _parent: parent,
            root,
            dest: tempfile::tempdir().unwrap(),
        }
    }

    fn manifest_of(root: &Path) -> Manifest {
        plan(root, &ExclusionSet::new().exact("README.md")).unwrap()
    }

    fn request(fx: &Fixture) -> ArchiveRequest {
        ArchiveRequest {
            destination: fx.dest.path().to_path_buf(),
            archived_at: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
            readme_path: fx.root.join("README.md"),
            readme_text: fs::read_to_string(fx.root.join("README.md")).unwrap(),
            compression_level: 6,
        }
    }

    #[test]
    fn test_artifact_name() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(artifact_name(Path::new("/data/proj"), at), "proj-20260102T030405Z.tar.gz");
    }

    #[test]
    fn test_commit_leaves_only_readme() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let mut archiver = Archiver::new(&manifest, request(&fx));
        let result = archiver.run().unwrap();

        assert_eq!(archiver.state(), ArchiveState::Committed);
        assert_eq!(
            archiver.history(),
            &[
                ArchiveState::Planned,
                ArchiveState::Writing,
                ArchiveState::Verifying,
                ArchiveState::Committed
            ]
        );
        assert_eq!(result.entry_count, 3);
        assert_eq!(result.total_bytes, 150);
        assert_eq!(result.artifact_checksum, hash_file(&result.artifact_path).unwrap().0);
        assert!(!partial_path(&result.artifact_path).exists());

        let left: Vec<String> = fs::read_dir(&fx.root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, vec!["README.md"]);

        let readme = fs::read_to_string(fx.root.join("README.md")).unwrap();
        assert!(readme.starts_with("Title: Study A\nOwner: J. Smith\n\n"));
        assert!(readme.contains(&format!("Archive-Checksum: {}", result.artifact_checksum)));
    }

    #[test]
    fn test_second_run_refused() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let mut archiver = Archiver::new(&manifest, request(&fx));
        archiver.run().unwrap();
        assert!(matches!(archiver.run(), Err(ArchiveError::Config(_))));
    }

    struct MutateOnWrite(PathBuf);

    impl TransitionHook for MutateOnWrite {
        fn on_enter(&mut self, state: ArchiveState, _manifest: &Manifest) -> io::Result<()> {
            if state == ArchiveState::Writing {
                fs::write(&self.0, vec![b'X'; 100])?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_concurrent_mutation_is_verification_error() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let readme_before = fs::read_to_string(fx.root.join("README.md")).unwrap();

        let mut archiver =
            Archiver::new(&manifest, request(&fx)).with_hook(MutateOnWrite(fx.root.join("data.csv")));
        let err = archiver.run().unwrap_err();

        match err {
            ArchiveError::Verification { mismatched } => assert_eq!(mismatched, vec!["data.csv"]),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(archiver.state(), ArchiveState::Failed);
        assert!(fx.root.join("notes.txt").exists());
        assert!(fx.root.join("raw/empty").is_dir());
        assert_eq!(fs::read_to_string(fx.root.join("README.md")).unwrap(), readme_before);
        assert_eq!(fs::read_dir(fx.dest.path()).unwrap().count(), 0);
    }

    struct GrowOnWrite(PathBuf);

    impl TransitionHook for GrowOnWrite {
        fn on_enter(&mut self, state: ArchiveState, _manifest: &Manifest) -> io::Result<()> {
            if state == ArchiveState::Writing {
                let mut file = OpenOptions::new().append(true).open(&self.0)?;
                file.write_all(b"more")?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_grown_file_is_mismatch() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let mut archiver =
            Archiver::new(&manifest, request(&fx)).with_hook(GrowOnWrite(fx.root.join("notes.txt")));
        let err = archiver.run().unwrap_err();
        assert!(matches!(err, ArchiveError::Verification { ref mismatched } if mismatched == &vec!["notes.txt".to_string()]));
    }

    struct FailAt(CommitStep);

    impl TransitionHook for FailAt {
        fn before_commit_step(&mut self, step: CommitStep) -> io::Result<()> {
            if step == self.0 {
                return Err(io::Error::new(ErrorKind::Other, "injected"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_failure_before_deletion_discards_artifact() {
        for step in [CommitStep::PublishArtifact, CommitStep::StageReadme] {
            let fx = fixture();
            let manifest = manifest_of(&fx.root);
            let mut archiver = Archiver::new(&manifest, request(&fx)).with_hook(FailAt(step));
            let err = archiver.run().unwrap_err();

            assert!(matches!(err, ArchiveError::ArchiveWrite { .. }), "step {:?}", step);
            assert_eq!(archiver.state(), ArchiveState::Failed);
            assert!(fx.root.join("data.csv").exists());
            assert_eq!(fs::read_dir(fx.dest.path()).unwrap().count(), 0, "step {:?}", step);
        }
    }

    #[test]
    fn test_failure_before_readme_swap_is_partial() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let readme_before = fs::read_to_string(fx.root.join("README.md")).unwrap();
        let mut archiver =
            Archiver::new(&manifest, request(&fx)).with_hook(FailAt(CommitStep::ReplaceReadme));
        let err = archiver.run().unwrap_err();

        assert!(err.needs_manual_review());
        assert_eq!(archiver.state(), ArchiveState::Partial);
        assert!(archiver.artifact_path().exists());
        assert!(!fx.root.join("data.csv").exists());
        assert_eq!(fs::read_to_string(fx.root.join("README.md")).unwrap(), readme_before);

        // the staged README temp file must not linger
        let left: Vec<String> = fs::read_dir(&fx.root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, vec!["README.md"]);
    }

    #[test]
    fn test_existing_artifact_not_overwritten() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let req = request(&fx);
        let existing = fx.dest.path().join(req.artifact_name(&fx.root));
        fs::write(&existing, b"previous").unwrap();

        let mut archiver = Archiver::new(&manifest, req);
        assert!(matches!(archiver.run(), Err(ArchiveError::ArchiveWrite { .. })));
        assert_eq!(fs::read(&existing).unwrap(), b"previous");
        assert!(fx.root.join("data.csv").exists());
    }

    #[test]
    fn test_artifact_contents() {
        let fx = fixture();
        let manifest = manifest_of(&fx.root);
        let result = Archiver::new(&manifest, request(&fx)).run().unwrap();

        let file = File::open(&result.artifact_path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                e.path().unwrap().to_string_lossy().trim_end_matches('/').to_string()
            })
            .collect();
        names.sort();
        assert_eq!(names, vec!["data.csv", "notes.txt", "raw/empty"]);
    }
}
