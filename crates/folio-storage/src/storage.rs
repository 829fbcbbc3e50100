//! Storage trait and error types.
//!
//! # Path convention
//!
//! Every path handed to a [`Storage`] method is relative and
//! forward-slash separated, resolved inside the storage root:
//! `"index.md"`, `"chapters/intro.md"`, or (for [`Storage::subview`])
//! a directory like `"chapters"`. Absolute paths, backslashes, and `..`
//! segments are rejected with [`StorageErrorKind::InvalidPath`] before
//! any backend sees them — a parse scoped to one root must not be able
//! to read outside it.

use std::path::PathBuf;
use std::sync::Arc;

/// Semantic category of a storage failure.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageErrorKind {
    /// The file or directory is not there.
    NotFound,
    /// The backend refused access.
    PermissionDenied,
    /// Absolute path, `..` escape, or otherwise malformed path.
    InvalidPath,
    /// The content is not valid UTF-8.
    InvalidEncoding,
    /// Anything the other kinds don't cover.
    Other,
}

impl StorageErrorKind {
    fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::PermissionDenied => "Permission denied",
            Self::InvalidPath => "Invalid path",
            Self::InvalidEncoding => "Invalid encoding",
            Self::Other => "Error",
        }
    }
}

/// A storage failure: semantic kind plus whatever context the backend
/// could attach.
///
/// Context accrues through the builder methods, so backends write
/// `StorageError::not_found(path).with_backend(BACKEND)` and callers
/// match on [`StorageError::kind`] without parsing messages.
#[derive(Debug)]
pub struct StorageError {
    /// Semantic category.
    pub kind: StorageErrorKind,
    /// The path the operation was resolving, when known.
    pub path: Option<PathBuf>,
    /// Which backend produced the error (`"Fs"`, `"Mock"`).
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// An error of the given kind with no context attached yet.
    #[must_use]
    pub fn new(kind: StorageErrorKind) -> Self {
        Self {
            kind,
            path: None,
            backend: None,
            source: None,
        }
    }

    /// Attach the path being resolved.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for a [`StorageErrorKind::NotFound`] error at `path`.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::new(StorageErrorKind::NotFound).with_path(path)
    }

    /// Shorthand for a [`StorageErrorKind::InvalidPath`] error at `path`.
    #[must_use]
    pub fn invalid_path(path: impl Into<PathBuf>) -> Self {
        Self::new(StorageErrorKind::InvalidPath).with_path(path)
    }

    /// Classify an I/O error and keep it as the source.
    #[must_use]
    pub fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::InvalidData => StorageErrorKind::InvalidEncoding,
            _ => StorageErrorKind::Other,
        };
        Self::new(kind).with_path(path).with_source(err)
    }

    /// True when the error just means the file does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }
}

impl std::fmt::Display for StorageError {
    /// Renders as `[Backend] Kind: source (path: chapters/intro.md)`,
    /// with absent context omitted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }
        f.write_str(self.kind.label())?;
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Read-only view of a file tree.
///
/// The engine's parser and snippet extractor resolve every file access
/// through this trait so that tests can substitute an in-memory backend
/// and includes can be scoped to a sub-directory.
pub trait Storage: Send + Sync {
    /// Read a file's full content as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the path is invalid, missing, or not
    /// valid UTF-8.
    fn read(&self, path: &str) -> Result<String, StorageError>;

    /// Whether a file exists at the given path.
    ///
    /// Errors read as "doesn't exist": the result is `false`.
    fn exists(&self, path: &str) -> bool;

    /// Modification time as seconds since the Unix epoch.
    ///
    /// Backends without timestamps may report `0.0` for existing files.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file doesn't exist or mtime can't
    /// be retrieved.
    fn mtime(&self, path: &str) -> Result<f64, StorageError>;

    /// A view rooted at a sub-directory.
    ///
    /// Paths passed to the returned storage resolve relative to `dir`,
    /// and the view cannot read above it. The parser sub-parses includes
    /// through such views so an included document resolves its own
    /// relative references.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if `dir` is invalid or does not exist.
    fn subview(&self, dir: &str) -> Result<Arc<dyn Storage>, StorageError>;
}

/// Validate a storage path and split it into components for the backend
/// to join.
pub(crate) fn validate_path(path: &str) -> Result<Vec<&str>, StorageError> {
    if path.starts_with('/') || path.contains('\\') {
        return Err(StorageError::invalid_path(path));
    }
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(StorageError::invalid_path(path)),
            other => parts.push(other),
        }
    }
    Ok(parts)
}
