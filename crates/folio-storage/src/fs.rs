//! Filesystem storage implementation.
//!
//! Provides [`FsStorage`], a read-only view of a directory on the local
//! filesystem. All paths resolve inside the root; [`FsStorage::subview`]
//! produces a new view rooted at a sub-directory.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::storage::{Storage, StorageError, StorageErrorKind, validate_path};

/// Backend identifier for error messages.
const BACKEND: &str = "Fs";

/// Filesystem storage rooted at a directory.
///
/// # Example
///
/// ```ignore
/// use std::path::PathBuf;
/// use folio_storage::{FsStorage, Storage};
///
/// let storage = FsStorage::new(PathBuf::from("book"));
/// let text = storage.read("chapters/intro.md")?;
/// let chapter_view = storage.subview("chapters")?;
/// ```
#[derive(Debug)]
pub struct FsStorage {
    /// Root directory all paths resolve inside.
    root: PathBuf,
}

impl FsStorage {
    /// Create a new filesystem storage rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The root directory of this view.
    #[must_use]
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Resolve a storage path to an on-disk path inside the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let parts = validate_path(path).map_err(|e| e.with_backend(BACKEND))?;
        let mut resolved = self.root.clone();
        resolved.extend(parts);
        Ok(resolved)
    }
}

impl Storage for FsStorage {
    fn read(&self, path: &str) -> Result<String, StorageError> {
        let resolved = self.resolve(path)?;
        tracing::trace!(path, "reading file");
        fs::read_to_string(&resolved).map_err(|e| StorageError::io(e, path).with_backend(BACKEND))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }

    fn mtime(&self, path: &str) -> Result<f64, StorageError> {
        let resolved = self.resolve(path)?;
        let metadata =
            fs::metadata(&resolved).map_err(|e| StorageError::io(e, path).with_backend(BACKEND))?;
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::io(e, path).with_backend(BACKEND))?;
        let since_epoch = modified
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StorageError::new(StorageErrorKind::Other).with_source(e))?;
        Ok(since_epoch.as_secs_f64())
    }

    fn subview(&self, dir: &str) -> Result<Arc<dyn Storage>, StorageError> {
        let resolved = self.resolve(dir)?;
        if !resolved.is_dir() {
            return Err(StorageError::not_found(dir).with_backend(BACKEND));
        }
        Ok(Arc::new(Self::new(resolved)))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn fixture() -> (TempDir, FsStorage) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("chapters")).unwrap();
        fs::write(tmp.path().join("index.md"), "# Book\n").unwrap();
        fs::write(tmp.path().join("chapters/intro.md"), "# Intro\n").unwrap();
        let storage = FsStorage::new(tmp.path().to_path_buf());
        (tmp, storage)
    }

    #[test]
    fn test_read_root_file() {
        let (_tmp, storage) = fixture();

        assert_eq!(storage.read("index.md").unwrap(), "# Book\n");
    }

    #[test]
    fn test_read_nested_file() {
        let (_tmp, storage) = fixture();

        assert_eq!(storage.read("chapters/intro.md").unwrap(), "# Intro\n");
    }

    #[test]
    fn test_read_missing_file() {
        let (_tmp, storage) = fixture();

        let err = storage.read("nope.md").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.backend, Some("Fs"));
    }

    #[test]
    fn test_read_rejects_escape() {
        let (_tmp, storage) = fixture();

        let err = storage.read("../outside.md").unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidPath);
    }

    #[test]
    fn test_exists() {
        let (_tmp, storage) = fixture();

        assert!(storage.exists("index.md"));
        assert!(!storage.exists("nope.md"));
        // Directories are not files
        assert!(!storage.exists("chapters"));
    }

    #[test]
    fn test_mtime_positive() {
        let (_tmp, storage) = fixture();

        assert!(storage.mtime("index.md").unwrap() > 0.0);
    }

    #[test]
    fn test_mtime_missing() {
        let (_tmp, storage) = fixture();

        assert!(storage.mtime("nope.md").is_err());
    }

    #[test]
    fn test_subview_scopes_resolution() {
        let (_tmp, storage) = fixture();

        let view = storage.subview("chapters").unwrap();
        assert_eq!(view.read("intro.md").unwrap(), "# Intro\n");
        // The parent's files are out of reach
        assert!(!view.exists("index.md"));
    }

    #[test]
    fn test_subview_missing_dir() {
        let (_tmp, storage) = fixture();

        assert!(storage.subview("nope").is_err());
    }

    #[test]
    fn test_subview_cannot_escape() {
        let (_tmp, storage) = fixture();

        let view = storage.subview("chapters").unwrap();
        assert!(view.read("../index.md").is_err());
    }
}
