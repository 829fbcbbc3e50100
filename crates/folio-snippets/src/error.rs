//! Snippet extraction errors.

use thiserror::Error;

/// Errors produced while parsing ranges or extracting snippets.
///
/// These surface through the enclosing code tag's construction failure,
/// so each message is written to stand on its own in a parse diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnippetError {
    /// Range spec did not match `"[+|-]start:[+|-]end"`.
    #[error("invalid range {spec:?}: {reason}")]
    InvalidRange {
        /// The offending range spec, verbatim.
        spec: String,
        /// Human-readable reason (missing colon, negative bound, ...).
        reason: String,
    },

    /// A `snippet: NAME` marker was opened but never closed.
    #[error("snippet {name:?} is missing its closing marker")]
    UnbalancedMarker {
        /// The snippet name left open at end of file.
        name: String,
    },

    /// The same snippet name was defined more than once in one file.
    #[error("snippet {name:?} is defined more than once in this file")]
    DuplicateName {
        /// The duplicated snippet name.
        name: String,
    },

    /// A requested snippet name does not exist in the file.
    #[error("no snippet named {name:?} in this file")]
    UnknownName {
        /// The requested snippet name.
        name: String,
    },
}

impl SnippetError {
    pub(crate) fn invalid_range(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            spec: spec.to_owned(),
            reason: reason.into(),
        }
    }
}
