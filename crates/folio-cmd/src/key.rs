//! Cache key computation for command results.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

/// Command parameters for cache key computation.
///
/// Two runs share a cache entry only when the command line and the
/// working directory's fingerprint both match: editing an input file in
/// the working directory invalidates the entry.
#[derive(Debug)]
pub struct CmdKey<'a> {
    /// Full command line as passed to the shell.
    pub command: &'a str,
    /// Fingerprint of the working directory's contents.
    pub dir_fingerprint: &'a str,
}

impl CmdKey<'_> {
    /// Compute a content hash for this key.
    ///
    /// # Hash Format
    ///
    /// Hex-encoded SHA-256 of `"{command}:{dir_fingerprint}"`.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.command.as_bytes());
        hasher.update(b":");
        hasher.update(self.dir_fingerprint.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Fingerprint a working directory's contents.
///
/// Hashes the sorted top-level directory listing with each entry's size
/// and mtime. Cheap enough to run per command while still noticing the
/// edits that matter (a changed input file next to the command).
/// Unreadable directories fingerprint as `"unreadable"`, which still
/// produces a stable key.
#[must_use]
pub fn fingerprint_dir(dir: &Path) -> String {
    let Ok(entries) = fs::read_dir(dir) else {
        return "unreadable".to_owned();
    };

    let mut lines: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().ok()?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            Some(format!("{name}\x00{len}\x00{mtime}", len = meta.len()))
        })
        .collect();
    lines.sort_unstable();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
