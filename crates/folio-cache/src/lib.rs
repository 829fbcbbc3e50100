//! Result caching for the folio document engine.
//!
//! Executing a document can be expensive: `<cmd>` tags shell out to
//! external processes whose results are worth keeping across runs. The
//! engine talks to that storage through two small traits so the backend
//! stays swappable:
//!
//! - [`Cache`] hands out named buckets
//! - [`CacheBucket`] is a key→bytes store with etag-based invalidation
//!
//! [`FileCache`] is the on-disk backend; [`NullCache`] disables caching
//! without changing any call site.
//!
//! ```
//! use folio_cache::{Cache, NullCache};
//!
//! let bucket = NullCache.bucket("results");
//! bucket.put("key", "", b"captured output");
//! assert_eq!(bucket.get("key", ""), None); // the null cache never hits
//! ```

mod file;
pub use file::FileCache;

/// A named key→bytes partition within a [`Cache`].
///
/// Values are validated by an etag chosen by the caller — a content
/// hash, an mtime, a version string. A lookup hits only when key and
/// etag both match; callers whose key is itself a content hash pass an
/// empty etag and skip the validation.
pub trait CacheBucket: Send + Sync {
    /// Look up a value stored under `key` with a matching `etag`.
    /// An empty `etag` accepts whatever is stored.
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Store a value, replacing any entry already under `key`.
    fn put(&self, key: &str, etag: &str, value: &[u8]);
}

/// Factory for named [`CacheBucket`]s.
///
/// Buckets with different names never see each other's keys. Asking for
/// the same name twice may return independent handles over the same
/// underlying storage.
pub trait Cache: Send + Sync {
    /// Open or create the bucket called `name`.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// [`CacheBucket`] that drops every write and misses every read.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _etag: &str, _value: &[u8]) {}
}

/// [`Cache`] used when caching is disabled.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}
