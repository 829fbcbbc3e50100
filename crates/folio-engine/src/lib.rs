//! Parsing, lifecycle, and execution engine for folio literate documents.
//!
//! A folio document is hybrid Markdown/HTML markup enriched with directive
//! tags: source-code inclusion with named snippets (`<code src=…>`),
//! external-command execution (`<cmd>`), cross-references (`<ref>`),
//! variable substitution (`<var>`). This crate turns such markup into a
//! typed tree and runs it through a six-stage lifecycle:
//!
//! 1. **PreParse** — ordered byte-level transforms (variable substitution,
//!    Markdown→HTML conversion)
//! 2. **Parse** — tree building plus typed tag construction
//! 3. **PostParse** — sequential depth-first repair hooks
//! 4. **PreExecute** — sequential depth-first validation, fail-fast
//! 5. **Execute** — the only concurrent stage; executable nodes run on a
//!    bounded scheduler and commit replacement children
//! 6. **PostExecute** — sequential depth-first fixup hooks
//!
//! Figure numbering and cross-reference rewiring are a separate,
//! host-invoked pass ([`RefProcessor`]) that runs after Execute so that
//! numbering reflects final document order.
//!
//! # Example
//!
//! ```ignore
//! use folio_engine::{ExecContext, Parser, RefProcessor};
//!
//! let mut parser = Parser::from_dir("book")?;
//! let doc = parser.parse_file("index.md")?;
//! doc.execute(&ExecContext::background())?;
//! RefProcessor::new().process(&doc)?;
//! println!("{}", doc.to_html());
//! ```

mod document;
mod error;
mod parser;
mod pipeline;
mod refs;
mod tree;

pub use document::Document;
pub use error::{
    EngineError, ExecError, HookError, ParseError, RefError, Stage, TagError, TransformError,
};
pub use folio_cmd::{CancelHandle, ExecContext, Interrupt};
pub use parser::{BuildContext, Parser, PreParse, TagConstructor, TagParts};
pub use pipeline::Scheduler;
pub use refs::{IdGenerator, RefProcessor, UuidGenerator};
pub use tree::{
    Atom, AttrError, Capability, CellKind, CmdTag, CodeKind, CodeTag, Element, FigureTag, Node,
    NodeRef, PageTag, RefTag, TagSpec, VarTag, escape_html, walk,
};
