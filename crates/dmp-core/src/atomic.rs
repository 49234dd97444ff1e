//! Temp-file staging for atomic replacement of a file
//!
//! The replacement is written next to the target (same filesystem), synced,
//! and only becomes visible once the caller persists it over the target.
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `contents` to a temp file beside `target`, copying the target's
/// permissions when it exists. Dropping the handle removes the temp file.
pub fn stage_replacement(target: &Path, contents: &[u8]) -> io::Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;

    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }

    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Stage and immediately rename over `target`
pub fn replace_file(target: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = stage_replacement(target, contents)?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Stage and rename into place, failing with `AlreadyExists` if `target` exists
pub fn create_file(target: &Path, contents: &[u8]) -> io::Result<()> {
    let temp = stage_replacement(target, contents)?;
    temp.persist_noclobber(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("README.md");
        fs::write(&target, "old").unwrap();

        replace_file(&target, b"new").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_create_file_never_clobbers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("README.md");

        create_file(&target, b"first").unwrap();
        let err = create_file(&target, b"second").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_stage_leaves_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("README.md");
        fs::write(&target, "old").unwrap();

        let staged = stage_replacement(&target, b"new").unwrap();
        drop(staged);
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
