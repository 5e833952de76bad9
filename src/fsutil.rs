use crate::errors::{RepositoryError, RepositoryOperation, RepositoryResult, RepositoryScope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes `bytes` next to `path` and renames over it, so readers see either
/// the old or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"))?;
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

pub fn write_json_file<T: Serialize>(scope: RepositoryScope, path: &Path, value: &T) -> RepositoryResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(RepositoryError::at(scope, RepositoryOperation::Serialize, path))?;
    bytes.push(b'\n');
    atomic_write(path, &bytes).map_err(RepositoryError::at(scope, RepositoryOperation::Write, path))
}

pub fn read_json_file<T: DeserializeOwned>(scope: RepositoryScope, path: &Path) -> RepositoryResult<T> {
    let bytes = fs::read(path).map_err(RepositoryError::at(scope, RepositoryOperation::Read, path))?;
    serde_json::from_slice(&bytes).map_err(RepositoryError::at(scope, RepositoryOperation::Parse, path))
}

pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

/// Directory entries in name order; a missing directory has none.
pub fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let reader = match fs::read_dir(dir) {
        Ok(reader) => reader,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error),
    };
    let mut entries = Vec::new();
    for entry in reader {
        entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
}

/// Removes empty directories from `dir` upwards, never touching `stop_at` or above.
pub fn prune_empty_dirs(dir: &Path, stop_at: &Path) -> io::Result<()> {
    let mut current = dir.to_path_buf();
    while current.starts_with(stop_at) && current != stop_at {
        if !current.is_dir() || fs::read_dir(&current)?.next().is_some() {
            break;
        }
        fs::remove_dir(&current)?;
        if !current.pop() {
            break;
        }
    }
    Ok(())
}

pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|value| value.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces_content() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("a/b/file.json");
        atomic_write(&path, b"one").expect("first write");
        atomic_write(&path, b"two").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        let leftovers = sorted_entries(&root.path().join("a/b")).expect("entries");
        assert_eq!(leftovers, vec![path]);
    }

    #[test]
    fn json_helpers_report_scope_and_operation() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("broken.json");
        fs::write(&path, "{not json").expect("write");
        let error = read_json_file::<serde_json::Value>(RepositoryScope::Edge, &path).expect_err("parse failure");
        assert_eq!(error.scope, RepositoryScope::Edge);
        assert_eq!(error.operation, RepositoryOperation::Parse);
        assert!(error.identifier.as_deref().unwrap_or_default().ends_with("broken.json"));

        let missing = read_json_file::<serde_json::Value>(RepositoryScope::Edge, &root.path().join("nope.json"))
            .expect_err("missing file");
        assert_eq!(missing.operation, RepositoryOperation::Read);
    }

    #[test]
    fn prune_stops_at_boundary_and_non_empty_dirs() {
        let root = tempfile::tempdir().expect("tempdir");
        let deep = root.path().join("graph/dates/2025-01-15/0001");
        fs::create_dir_all(&deep).expect("mkdir");
        fs::write(root.path().join("graph/dates/keep.txt"), "x").expect("write");
        prune_empty_dirs(&deep, &root.path().join("graph")).expect("prune");
        assert!(!root.path().join("graph/dates/2025-01-15").exists());
        assert!(root.path().join("graph/dates").exists());
    }

    #[test]
    fn missing_directories_are_empty_and_removable() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(sorted_entries(&root.path().join("absent")).expect("entries").is_empty());
        remove_dir_if_exists(&root.path().join("absent")).expect("remove absent dir");
        assert!(!remove_file_if_exists(&root.path().join("absent.txt")).expect("remove absent file"));
    }
}
