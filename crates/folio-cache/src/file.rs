//! On-disk cache backend.
//!
//! Entries live one file per key inside a per-bucket directory. The entry
//! file starts with the etag it was stored under, so a lookup can reject
//! a stale entry before touching the payload:
//!
//! ```text
//! [etag_len: u32 LE][etag bytes][payload bytes]
//! ```
//!
//! The cache root carries a `VERSION` sentinel checked when the cache is
//! opened. A sentinel that is absent or does not match the current value
//! wipes the root, so entries written by an incompatible build are never
//! served.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{Cache, CacheBucket};

/// On-disk [`Cache`] rooted at a directory.
///
/// Layout: `{root}/VERSION` plus one directory per bucket, one entry file
/// per key inside it. Every operation is best-effort; an unreadable or
/// unwritable cache degrades to misses rather than failing the caller.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open (or initialize) the cache at `root`.
    ///
    /// Wipes the directory when the `VERSION` sentinel does not match
    /// `version`.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        check_version_sentinel(&root, version);
        Self { root }
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileBucket {
            dir: self.root.join(name),
        })
    }
}

/// One bucket directory.
struct FileBucket {
    dir: PathBuf,
}

impl FileBucket {
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl CacheBucket for FileBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let mut entry = File::open(self.entry_path(key)).ok()?;

        let stored_etag = read_etag(&mut entry)?;
        if !etag.is_empty() && stored_etag != etag.as_bytes() {
            tracing::trace!(key, "cache entry rejected by etag");
            return None;
        }

        let mut payload = Vec::new();
        entry.read_to_end(&mut payload).ok()?;
        Some(payload)
    }

    fn put(&self, key: &str, etag: &str, value: &[u8]) {
        if fs::create_dir_all(&self.dir).is_err() {
            return;
        }

        let mut entry = Vec::with_capacity(4 + etag.len() + value.len());
        entry.extend_from_slice(&u32::try_from(etag.len()).unwrap_or(0).to_le_bytes());
        entry.extend_from_slice(etag.as_bytes());
        entry.extend_from_slice(value);
        let _ = fs::write(self.entry_path(key), entry);
    }
}

/// Read the etag header off an entry file.
fn read_etag(entry: &mut File) -> Option<Vec<u8>> {
    let mut len = [0u8; 4];
    entry.read_exact(&mut len).ok()?;
    let mut etag = vec![0u8; u32::from_le_bytes(len) as usize];
    entry.read_exact(&mut etag).ok()?;
    Some(etag)
}

/// Wipe the cache root unless its sentinel matches `version`.
fn check_version_sentinel(root: &Path, version: &str) {
    let sentinel = root.join("VERSION");
    let stored = fs::read_to_string(&sentinel).ok();

    if stored.as_deref() == Some(version) {
        tracing::debug!(version, "cache version matches");
        return;
    }
    match stored {
        Some(stored) => {
            tracing::info!(stored, current = version, "cache version changed, wiping");
        }
        None => tracing::info!("initializing cache"),
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("could not wipe cache root: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("could not create cache root: {e}");
        return;
    }
    if let Err(e) = fs::write(&sentinel, version) {
        tracing::warn!("could not write cache sentinel: {e}");
    }
}
