//! Archive planner: walk a directory into an ordered, hashed manifest.
//!
//! Symlinks are recorded, never followed. Leaf directories become
//! `empty_directory` entries. Any unreadable entry aborts the whole plan.
use dmp_core::{hash_file, ArchiveError, Manifest, ManifestEntry, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path};
use walkdir::WalkDir;

use crate::exclude::ExclusionSet;

pub fn plan(root: &Path, exclusions: &ExclusionSet) -> Result<Manifest> {
    let meta = fs::symlink_metadata(root).map_err(|e| ArchiveError::plan(root, e))?;
    if !meta.is_dir() {
        return Err(ArchiveError::plan(root, "not a directory"));
    }

    let mut entries = Vec::new();
    let mut dirs = Vec::new();
    let mut non_empty: HashSet<String> = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| match relative_path(root, e.path()) {
            Some(rel) => !exclusions.is_excluded(&rel),
            None => true,
        });

    for item in walker {
        let entry = item.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            ArchiveError::plan(path, e)
        })?;
        let path = entry.path();
        let rel = relative_path(root, path)
            .ok_or_else(|| ArchiveError::plan(path, "path is not valid UTF-8"))?;

        if let Some((parent, _)) = rel.rsplit_once('/') {
            non_empty.insert(parent.to_string());
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(|e| ArchiveError::plan(path, e))?;
            let target = target
                .to_str()
                .ok_or_else(|| ArchiveError::plan(path, "link target is not valid UTF-8"))?
                .to_string();
            tracing::debug!(entry = %rel, target = %target, "planned symlink");
            entries.push(ManifestEntry::symlink(rel, target));
        } else if file_type.is_dir() {
            dirs.push(rel);
        } else if file_type.is_file() {
            let (checksum, size) = hash_file(path).map_err(|e| ArchiveError::plan(path, e))?;
            tracing::debug!(entry = %rel, size, "planned file");
            entries.push(ManifestEntry::file(rel, size, checksum));
        } else {
            return Err(ArchiveError::plan(
                path,
                "unsupported file type (fifo, socket or device)",
            ));
        }
    }

    for dir in dirs {
        if !non_empty.contains(&dir) {
            tracing::debug!(entry = %dir, "planned empty directory");
            entries.push(ManifestEntry::empty_directory(dir));
        }
    }

    let manifest = Manifest::new(root, entries);
    tracing::info!(
        root = %root.display(),
        entries = manifest.len(),
        total_bytes = manifest.total_bytes(),
        excluded = ?exclusions.describe(),
        "planned archive manifest"
    );
    Ok(manifest)
}

/// `/`-joined path of `path` below `root`; `None` when not below root or not UTF-8
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmp_core::{hash_bytes, EntryKind};

    fn exclusions() -> ExclusionSet {
        ExclusionSet::new().exact("README.md").exact(".dmp-archive.lock")
    }

    #[test]
    fn test_plan_files_sorted_and_hashed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "Owner: A\n").unwrap();
        fs::write(dir.path().join("notes.txt"), vec![b'n'; 50]).unwrap();
        fs::write(dir.path().join("data.csv"), vec![b'd'; 100]).unwrap();
        fs::create_dir_all(dir.path().join("raw/2024")).unwrap();
        fs::write(dir.path().join("raw/2024/a.bin"), b"abc").unwrap();

        let manifest = plan(dir.path(), &exclusions()).unwrap();
        let paths: Vec<&str> = manifest.entries().iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["data.csv", "notes.txt", "raw/2024/a.bin"]);
        assert_eq!(manifest.total_bytes(), 153);
        assert_eq!(
            manifest.get("raw/2024/a.bin").unwrap().checksum.as_deref(),
            Some(hash_bytes(b"abc").as_str())
        );
    }

    #[test]
    fn test_empty_directories_recorded() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("c/file"), b"x").unwrap();

        let manifest = plan(dir.path(), &exclusions()).unwrap();
        let dirs: Vec<&str> = manifest
            .entries()
            .iter()
            .filter(|e| e.is_directory())
            .map(|e| e.relative_path.as_str())
            .collect();
        assert_eq!(dirs, vec!["a/b"]);
    }

    #[test]
    fn test_excluded_directory_pruned() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("cache/big.bin"), vec![0u8; 4096]).unwrap();
        fs::write(dir.path().join("keep.txt"), b"keep").unwrap();

        let set = exclusions().pattern("cache").unwrap();
        let manifest = plan(dir.path(), &set).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.total_bytes(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret"), b"outside root").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let manifest = plan(dir.path(), &exclusions()).unwrap();
        assert_eq!(manifest.len(), 1);
        let entry = &manifest.entries()[0];
        assert_eq!(entry.size_bytes, 0);
        assert_eq!(
            entry.kind,
            EntryKind::Symlink {
                target: outside.path().to_str().unwrap().to_string()
            }
        );
    }

    #[test]
    fn test_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(plan(&file, &exclusions()), Err(ArchiveError::Planning { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_aborts() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked.dat");
        fs::write(&locked, b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root can read anything; only meaningful for unprivileged runs
        if fs::read(&locked).is_err() {
            let err = plan(dir.path(), &exclusions()).unwrap_err();
            match err {
                ArchiveError::Planning { path, .. } => assert_eq!(path, locked),
                other => panic!("unexpected error: {}", other),
            }
        }
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_aborts_plan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.csv"), b"x").unwrap();
        let socket = dir.path().join("agent.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();

        match plan(dir.path(), &exclusions()) {
            Err(ArchiveError::Planning { path, reason }) => {
                assert_eq!(path, socket);
                assert!(reason.contains("unsupported file type"));
            }
            other => panic!("expected planning error, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/data/proj");
        assert_eq!(relative_path(root, Path::new("/data/proj/a/b.txt")).as_deref(), Some("a/b.txt"));
        assert_eq!(relative_path(root, root), None);
        assert_eq!(relative_path(root, Path::new("/elsewhere")), None);
    }
}
