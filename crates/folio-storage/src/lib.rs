//! Virtual filesystem abstraction for the folio document engine.
//!
//! Every file the engine touches — documents, includes, snippet sources —
//! is read through the [`Storage`] trait, never through `std::fs` directly.
//! This enables:
//!
//! - **Unit testing** without touching the real filesystem
//! - **Sandboxing**: a parse is scoped to one storage root and cannot
//!   read outside it
//! - **Sub-views**: includes re-root resolution at the included file's
//!   directory via [`Storage::subview`]
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use folio_storage::{FsStorage, Storage};
//!
//! let storage = FsStorage::new(PathBuf::from("book"));
//! let text = storage.read("chapters/intro.md")?;
//! ```

mod fs;
#[cfg(feature = "mock")]
mod mock;
mod storage;

pub use fs::FsStorage;
#[cfg(feature = "mock")]
pub use mock::MockStorage;
pub use storage::{Storage, StorageError, StorageErrorKind};
