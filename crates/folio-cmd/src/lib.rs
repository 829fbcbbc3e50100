//! External command execution for the folio document engine.
//!
//! `<cmd>` tags shell out during the Execute stage. This crate owns that
//! side effect end to end:
//!
//! - [`CommandRunner`]: spawns commands, captures stdout/stderr/exit
//!   status, observes deadlines and cancellation, and kills the child on
//!   interruption so no process is left orphaned
//! - [`CmdKey`]: sha256 cache keys over (command, working-directory
//!   fingerprint)
//! - on-disk memoization through a [`folio_cache::CacheBucket`], with an
//!   in-process single-flight table guaranteeing at most one actual
//!   execution per key within a run — duplicate concurrent requests block
//!   on the first execution and share its result
//! - [`ExecContext`]: the cooperative cancellation/deadline signal the
//!   whole execution pipeline threads through its stages

mod context;
mod error;
mod key;
mod runner;

pub use context::{CancelHandle, ExecContext, Interrupt};
pub use error::CmdError;
pub use key::{CmdKey, fingerprint_dir};
pub use runner::{CmdOutput, CmdRequest, CommandRunner};
