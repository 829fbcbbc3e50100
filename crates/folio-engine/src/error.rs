//! The engine's error taxonomy.
//!
//! Every lifecycle stage has its own [`EngineError`] variant carrying the
//! underlying cause and, where applicable, the file and storage root it
//! happened in. Callers test stages with [`EngineError::stage`] (payload
//! independent), walk to the innermost cause with
//! [`EngineError::root_cause`], and obtain a machine-readable form with
//! [`EngineError::to_json`].
//!
//! Hook-stage failures never replace the error the hook was invoked with:
//! [`HookError`] carries both, and its message reads as
//! `"hook error; original error"`.

use std::error::Error as StdError;

use folio_cmd::CmdError;
use folio_snippets::SnippetError;
use folio_storage::StorageError;
use thiserror::Error;

use crate::tree::AttrError;

/// Identifies a lifecycle stage independent of error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Byte-level transform chain.
    PreParse,
    /// Tree building and tag construction.
    Parse,
    /// Post-parse repair hooks.
    PostParse,
    /// Pre-execution validation.
    PreExecute,
    /// Concurrent execution.
    Execute,
    /// Post-execution fixup hooks.
    PostExecute,
}

impl Stage {
    /// Stable lowercase name used in structured output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreParse => "preparse",
            Self::Parse => "parse",
            Self::PostParse => "postparse",
            Self::PreExecute => "preexecute",
            Self::Execute => "execute",
            Self::PostExecute => "postexecute",
        }
    }
}

/// A failed byte-level transform in the PreParse chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    /// What went wrong, rendered for diagnostics.
    pub message: String,
}

impl TransformError {
    /// Create a transform error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A specialized tag's construction failure.
#[derive(Debug, Error)]
pub enum TagError {
    /// A required attribute was missing or empty.
    #[error(transparent)]
    Attr(#[from] AttrError),

    /// A referenced source file does not exist in the active storage view.
    #[error("source file {path:?} does not exist")]
    MissingSource {
        /// The path as written in the tag.
        path: String,
    },

    /// Snippet extraction failed for the tag's source file.
    #[error(transparent)]
    Snippet(#[from] SnippetError),

    /// Reading a referenced file failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The tag's shape is invalid (bad attribute value, missing content).
    #[error("{0}")]
    Invalid(String),

    /// Sub-parsing an included file failed.
    #[error("include {path:?}: {source}")]
    Include {
        /// The included path as written in the tag.
        path: String,
        /// The sub-parse's failure.
        #[source]
        source: Box<EngineError>,
    },
}

/// A Parse-stage failure.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Reading the document through storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The markup could not be tokenized into a tree.
    #[error("malformed markup: {0}")]
    Malformed(String),

    /// A tag constructor rejected its element.
    #[error("tag <{atom}>: {source}")]
    Constructor {
        /// Atom of the offending element.
        atom: String,
        /// The construction failure.
        #[source]
        source: TagError,
    },
}

/// An Execute- or PreExecute-stage failure.
#[derive(Debug, Error)]
pub enum ExecError {
    /// An external command failed.
    #[error(transparent)]
    Cmd(#[from] CmdError),

    /// The run was canceled or timed out outside a command.
    #[error(transparent)]
    Interrupted(#[from] folio_cmd::Interrupt),

    /// `Document::execute` was called a second time.
    #[error("document has already been executed")]
    AlreadyExecuted,

    /// A node failed pre-execution validation.
    #[error("{0}")]
    Invalid(String),

    /// Scheduling infrastructure failed.
    #[error("scheduler: {0}")]
    Scheduler(String),
}

impl ExecError {
    /// True when this failure is a cancellation or deadline expiry.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Interrupted(_) => true,
            Self::Cmd(cmd) => cmd.is_interrupted(),
            _ => false,
        }
    }

    /// True when the failure was specifically a deadline expiry.
    #[must_use]
    pub fn is_deadline(&self) -> bool {
        match self {
            Self::Interrupted(i) => *i == folio_cmd::Interrupt::DeadlineExceeded,
            Self::Cmd(cmd) => cmd.is_deadline(),
            _ => false,
        }
    }
}

/// A hook failure combined with the error the hook was invoked with.
///
/// PostParse and PostExecute hooks run even when the preceding stage
/// failed, and a hook's own failure must never swallow that earlier
/// error. The display form reads `"hook error; original error"`; both
/// errors stay reachable — the hook's own through
/// [`std::error::Error::source`], the earlier one through
/// [`HookError::prior`].
#[derive(Debug)]
pub struct HookError {
    /// Which hook stage failed.
    pub stage: Stage,
    /// Identification of the failing hook instance (atom plus context).
    pub hook: String,
    /// The hook's own error.
    source: Box<dyn StdError + Send + Sync>,
    /// The error the hook was invoked with, if any.
    prior: Option<Box<EngineError>>,
}

impl HookError {
    /// Combine a hook's own failure with the incoming error.
    #[must_use]
    pub fn new(
        stage: Stage,
        hook: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
        prior: Option<EngineError>,
    ) -> Self {
        Self {
            stage,
            hook: hook.into(),
            source: Box::new(source),
            prior: prior.map(Box::new),
        }
    }

    /// The error the hook was invoked with, if the stage had already
    /// failed.
    #[must_use]
    pub fn prior(&self) -> Option<&EngineError> {
        self.prior.as_deref()
    }

    /// The hook's own error.
    #[must_use]
    pub fn hook_cause(&self) -> &(dyn StdError + 'static) {
        self.source.as_ref()
    }
}

impl std::fmt::Display for HookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} hook {}: {}", self.stage.as_str(), self.hook, self.source)?;
        if let Some(prior) = &self.prior {
            write!(f, "; {prior}")?;
        }
        Ok(())
    }
}

impl StdError for HookError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The engine's top-level error: one variant per lifecycle stage.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A PreParse transform failed.
    #[error("preparse transform {transform:?} ({file:?}): {source}")]
    PreParse {
        /// Name of the failing transform.
        transform: String,
        /// Document being transformed.
        file: String,
        /// The transform's failure.
        #[source]
        source: TransformError,
    },

    /// Parsing failed.
    #[error("parse {file:?} (root {root:?}): {source}")]
    Parse {
        /// Document being parsed.
        file: String,
        /// Storage root the parse was scoped to.
        root: String,
        /// The parse failure.
        #[source]
        source: ParseError,
    },

    /// A PostParse hook failed.
    #[error("{0}")]
    PostParse(#[source] HookError),

    /// Pre-execution validation failed.
    #[error("preexecute {file:?}: {source}")]
    PreExecute {
        /// Document being executed.
        file: String,
        /// The validation failure.
        #[source]
        source: ExecError,
    },

    /// Execution failed; carries the first failing unit of work.
    #[error("execute {file:?} (root {root:?}): {source}")]
    Execute {
        /// Document being executed.
        file: String,
        /// Storage root of the document.
        root: String,
        /// The first failure.
        #[source]
        source: ExecError,
    },

    /// A PostExecute hook failed.
    #[error("{0}")]
    PostExecute(#[source] HookError),
}

impl EngineError {
    /// The lifecycle stage this error belongs to, independent of payload.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::PreParse { .. } => Stage::PreParse,
            Self::Parse { .. } => Stage::Parse,
            Self::PostParse(_) => Stage::PostParse,
            Self::PreExecute { .. } => Stage::PreExecute,
            Self::Execute { .. } => Stage::Execute,
            Self::PostExecute(_) => Stage::PostExecute,
        }
    }

    /// True for Parse-stage errors, regardless of which node produced
    /// them.
    #[must_use]
    pub fn is_parse(&self) -> bool {
        self.stage() == Stage::Parse
    }

    /// True for Execute-stage errors, regardless of which node produced
    /// them.
    #[must_use]
    pub fn is_execute(&self) -> bool {
        self.stage() == Stage::Execute
    }

    /// True when the run was canceled or its deadline passed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::PreExecute { source, .. } | Self::Execute { source, .. } => {
                source.is_interrupted()
            }
            _ => false,
        }
    }

    /// True when the failure was specifically a deadline expiry.
    #[must_use]
    pub fn is_deadline(&self) -> bool {
        match self {
            Self::PreExecute { source, .. } | Self::Execute { source, .. } => source.is_deadline(),
            _ => false,
        }
    }

    /// Walk the source chain to the innermost cause.
    #[must_use]
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut cause: &(dyn StdError + 'static) = self;
        while let Some(next) = cause.source() {
            cause = next;
        }
        cause
    }

    /// Structured representation with a `"type"` discriminator for
    /// machine consumption.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = match self {
            Self::PreParse {
                transform, file, ..
            } => serde_json::json!({
                "transform": transform,
                "file": file,
            }),
            Self::Parse { file, root, source } => {
                let mut value = serde_json::json!({
                    "file": file,
                    "root": root,
                });
                // Surface the offending atom when a constructor failed
                if let ParseError::Constructor { atom, .. } = source {
                    value["atom"] = serde_json::Value::from(atom.as_str());
                }
                value
            }
            Self::PostParse(hook) | Self::PostExecute(hook) => serde_json::json!({
                "hook": hook.hook,
                "hook_error": hook.hook_cause().to_string(),
                "prior": hook.prior().map(|p| p.to_json()),
            }),
            Self::PreExecute { file, .. } => serde_json::json!({
                "file": file,
            }),
            Self::Execute { file, root, source } => {
                let mut value = serde_json::json!({
                    "file": file,
                    "root": root,
                });
                // External-process failures carry full diagnostics
                if let ExecError::Cmd(cmd) = source {
                    value["cmd"] = cmd.to_json();
                }
                value
            }
        };
        json["type"] = serde_json::Value::from(self.stage().as_str());
        json["message"] = serde_json::Value::from(self.to_string());
        json
    }
}

/// A figure/reference numbering failure.
///
/// Produced by the renumbering pass, which aborts on the first invalid
/// figure; a partially renumbered tree must not be used.
#[derive(Debug, Error)]
pub enum RefError {
    /// A figure has no caption child.
    #[error("figure {id:?} has no caption")]
    MissingCaption {
        /// The figure's id (or a positional placeholder when absent).
        id: String,
    },

    /// A figure's caption has no content.
    #[error("figure {id:?} has an empty caption")]
    EmptyCaption {
        /// The figure's id (or a positional placeholder when absent).
        id: String,
    },

    /// A figure has more than one caption child.
    #[error("figure {id:?} has {count} captions, expected exactly one")]
    MultipleCaptions {
        /// The figure's id (or a positional placeholder when absent).
        id: String,
        /// How many captions were found.
        count: usize,
    },
}

impl RefError {
    /// Structured representation with a `"type"` discriminator.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let (kind, id) = match self {
            Self::MissingCaption { id } => ("missing-caption", id),
            Self::EmptyCaption { id } => ("empty-caption", id),
            Self::MultipleCaptions { id, .. } => ("multiple-captions", id),
        };
        serde_json::json!({
            "type": kind,
            "figure": id,
            "message": self.to_string(),
        })
    }
}
