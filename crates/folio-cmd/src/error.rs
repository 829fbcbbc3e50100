//! Command execution errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::context::Interrupt;

/// A failed external command.
///
/// Variants hold owned strings rather than source errors so results can
/// be cloned and shared across waiters blocked on the same in-flight
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CmdError {
    /// The process could not be spawned at all.
    #[error("failed to spawn {command:?} in {dir}: {message}", dir = .dir.display())]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// Working directory of the attempt.
        dir: PathBuf,
        /// The underlying I/O error, rendered.
        message: String,
    },

    /// The process exited with a status other than the expected one.
    #[error("{command:?} in {dir} exited with {exit} (expected {expected})", dir = .dir.display())]
    ExitMismatch {
        /// The command line that ran.
        command: String,
        /// Working directory the process ran in.
        dir: PathBuf,
        /// Expected exit code.
        expected: i32,
        /// Actual exit code (-1 when killed by a signal).
        exit: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Reading the process's output failed after it started.
    #[error("i/o error while running {command:?}: {message}")]
    Io {
        /// The command line that ran.
        command: String,
        /// The underlying I/O error, rendered.
        message: String,
    },

    /// The run was canceled or its deadline passed; the child process was
    /// killed before this error was produced.
    #[error("{command:?} interrupted: {interrupt}")]
    Interrupted {
        /// The command line that was interrupted.
        command: String,
        /// Whether this was a cancellation or a deadline expiry.
        interrupt: Interrupt,
    },
}

impl CmdError {
    /// True when this failure is a cancellation/deadline interruption.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// True when the interruption was specifically a deadline expiry.
    #[must_use]
    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            Self::Interrupted {
                interrupt: Interrupt::DeadlineExceeded,
                ..
            }
        )
    }

    /// Structured representation with a `"type"` discriminator.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Spawn {
                command,
                dir,
                message,
            } => serde_json::json!({
                "type": "spawn",
                "command": command,
                "dir": dir.display().to_string(),
                "message": message,
            }),
            Self::ExitMismatch {
                command,
                dir,
                expected,
                exit,
                stdout,
                stderr,
            } => serde_json::json!({
                "type": "exit-mismatch",
                "command": command,
                "dir": dir.display().to_string(),
                "expected": expected,
                "exit": exit,
                "stdout": stdout,
                "stderr": stderr,
            }),
            Self::Io { command, message } => serde_json::json!({
                "type": "io",
                "command": command,
                "message": message,
            }),
            Self::Interrupted { command, interrupt } => serde_json::json!({
                "type": "interrupted",
                "command": command,
                "interrupt": interrupt.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_mismatch_display() {
        let err = CmdError::ExitMismatch {
            command: "false".to_owned(),
            dir: PathBuf::from("/tmp"),
            expected: 0,
            exit: 1,
            stdout: String::new(),
            stderr: String::new(),
        };

        assert_eq!(err.to_string(), "\"false\" in /tmp exited with 1 (expected 0)");
    }

    #[test]
    fn test_interrupted_classification() {
        let deadline = CmdError::Interrupted {
            command: "sleep 5".to_owned(),
            interrupt: Interrupt::DeadlineExceeded,
        };
        let canceled = CmdError::Interrupted {
            command: "sleep 5".to_owned(),
            interrupt: Interrupt::Canceled,
        };

        assert!(deadline.is_interrupted());
        assert!(deadline.is_deadline());
        assert!(canceled.is_interrupted());
        assert!(!canceled.is_deadline());
    }

    #[test]
    fn test_to_json_discriminator() {
        let err = CmdError::ExitMismatch {
            command: "false".to_owned(),
            dir: PathBuf::from("/tmp"),
            expected: 0,
            exit: 1,
            stdout: "out".to_owned(),
            stderr: "err".to_owned(),
        };
        let json = err.to_json();

        assert_eq!(json["type"], "exit-mismatch");
        assert_eq!(json["exit"], 1);
        assert_eq!(json["stderr"], "err");
    }
}
