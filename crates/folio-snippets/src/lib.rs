//! Marker- and range-based source excerpt extraction.
//!
//! Code tags pull excerpts out of source files in one of two ways:
//!
//! - an explicit line range (`"[+|-]start:[+|-]end"`), parsed by [`Range`]
//! - a named snippet, bounded by a matching pair of `snippet: NAME`
//!   marker comments, extracted by [`SnippetSource`]
//!
//! Marker comments are formatted per source-file extension: `//` for
//! Rust/C-family files, `#` for scripts, `<!-- -->` for markup. The
//! excerpt is strictly the lines *between* the two markers; the marker
//! lines themselves are never part of it.
//!
//! All named snippets in a file are extracted eagerly on first read into
//! a name→excerpt map, so later lookups and range queries never re-scan
//! the file. Snippet names must be unique within one file.
//!
//! ```
//! use folio_snippets::{Conventions, SnippetSource};
//!
//! let source = "// snippet: demo\nline1\nline2\n// snippet: demo\n";
//! let parsed = SnippetSource::parse(source, "rs", &Conventions::default()).unwrap();
//! assert_eq!(parsed.named("demo").unwrap(), "line1\nline2");
//! ```

mod conventions;
mod error;
mod range;
mod source;

pub use conventions::{CommentStyle, Conventions};
pub use error::SnippetError;
pub use range::Range;
pub use source::SnippetSource;
