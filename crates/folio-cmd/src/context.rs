//! Cooperative cancellation and deadline signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Why an execution stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupt {
    /// The caller canceled the run.
    #[error("execution canceled")]
    Canceled,
    /// The caller's deadline passed.
    #[error("execution deadline exceeded")]
    DeadlineExceeded,
}

/// Caller-supplied execution context: a cancel flag plus an optional
/// deadline.
///
/// The context is cloned freely across workers; clones share the cancel
/// flag. Long-running operations must call [`ExecContext::check`] at
/// least at their start boundary, and pollable operations (process
/// waits) should re-check periodically so cancellation takes effect
/// promptly.
#[derive(Debug, Clone)]
pub struct ExecContext {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context that never cancels and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A context whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A cancellable context and the handle that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, CancelHandle) {
        let ctx = Self::background();
        let handle = CancelHandle {
            cancel: Arc::clone(&ctx.cancel),
        };
        (ctx, handle)
    }

    /// Derive a context sharing this one's cancel flag with an added
    /// deadline (the earlier of the two wins).
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(deadline)),
            None => Some(deadline),
        };
        Self {
            cancel: Arc::clone(&self.cancel),
            deadline,
        }
    }

    /// Check for cancellation or deadline expiry.
    ///
    /// # Errors
    ///
    /// Returns the applicable [`Interrupt`]; cancellation takes
    /// precedence over the deadline when both hold.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.load(Ordering::Acquire) {
            return Err(Interrupt::Canceled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupt::DeadlineExceeded);
        }
        Ok(())
    }

    /// True when [`ExecContext::check`] would fail.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Time left until the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Cancels the [`ExecContext`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancel the associated context (and all of its clones).
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}
