//! Mock storage implementation for testing.
//!
//! Provides [`MockStorage`] for unit testing parsers and extractors
//! without filesystem access.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::storage::{Storage, StorageError, validate_path};

/// Backend identifier for error messages.
const BACKEND: &str = "Mock";

/// In-memory storage for testing.
///
/// Stores file contents keyed by normalized relative path. Use the
/// builder methods to configure the mock with test data.
///
/// # Example
///
/// ```ignore
/// use folio_storage::{MockStorage, Storage};
///
/// let storage = MockStorage::new()
///     .with_file("index.md", "# Book\n")
///     .with_file("src/demo.rs", "fn main() {}\n");
///
/// assert!(storage.exists("index.md"));
/// ```
#[derive(Debug, Default)]
pub struct MockStorage {
    files: RwLock<HashMap<String, String>>,
}

impl MockStorage {
    /// Create a new empty mock storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with the given path and content.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files
            .write()
            .unwrap()
            .insert(normalize(&path.into()), content.into());
        self
    }

    /// Add a file after construction (for tests mutating state mid-run).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files
            .write()
            .unwrap()
            .insert(normalize(&path.into()), content.into());
    }
}

/// Normalize a path to its validated joined form, or keep it verbatim
/// when invalid (the accessor will reject it anyway).
fn normalize(path: &str) -> String {
    validate_path(path).map_or_else(|_| path.to_owned(), |parts| parts.join("/"))
}

impl Storage for MockStorage {
    fn read(&self, path: &str) -> Result<String, StorageError> {
        let key = validate_path(path)
            .map_err(|e| e.with_backend(BACKEND))?
            .join("/");
        self.files
            .read()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(path).with_backend(BACKEND))
    }

    fn exists(&self, path: &str) -> bool {
        let Ok(parts) = validate_path(path) else {
            return false;
        };
        self.files.read().unwrap().contains_key(&parts.join("/"))
    }

    fn mtime(&self, path: &str) -> Result<f64, StorageError> {
        if self.exists(path) {
            Ok(0.0)
        } else {
            Err(StorageError::not_found(path).with_backend(BACKEND))
        }
    }

    fn subview(&self, dir: &str) -> Result<Arc<dyn Storage>, StorageError> {
        let prefix = validate_path(dir)
            .map_err(|e| e.with_backend(BACKEND))?
            .join("/");
        if prefix.is_empty() {
            // Root view: clone all files
            let files = self.files.read().unwrap().clone();
            return Ok(Arc::new(Self {
                files: RwLock::new(files),
            }));
        }

        let lead = format!("{prefix}/");
        let files: HashMap<String, String> = self
            .files
            .read()
            .unwrap()
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&lead)
                    .map(|rest| (rest.to_owned(), v.clone()))
            })
            .collect();
        if files.is_empty() {
            return Err(StorageError::not_found(dir).with_backend(BACKEND));
        }
        Ok(Arc::new(Self {
            files: RwLock::new(files),
        }))
    }
}
