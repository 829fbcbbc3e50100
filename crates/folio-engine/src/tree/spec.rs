//! Specialized tag variants.
//!
//! Every element carries a [`TagSpec`] choosing its behavior: how it is
//! constructed and validated, which lifecycle capabilities it implements,
//! and how it serializes. The set is closed — capability dispatch is an
//! explicit match, never reflection. Host-specific vocabularies decorate
//! generic elements through the parser's custom-tag registry instead of
//! adding variants.

use std::sync::{RwLock, Weak};

use crate::tree::Node;

/// Which flavor of code tag this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// Inline code span.
    Inline,
    /// Fenced block with literal content.
    Fenced,
    /// Excerpt pulled from one source file.
    Source,
    /// Excerpts pulled from several source files.
    MultiSource,
}

/// Payload of a code tag. The excerpt itself lives in the element's text
/// child; this records where it came from.
#[derive(Debug)]
pub struct CodeTag {
    /// Inline, fenced, or source-backed.
    pub kind: CodeKind,
    /// Language hint for highlighting hosts.
    pub lang: Option<String>,
    /// Backing source files, in order (empty for inline/fenced).
    pub sources: Vec<String>,
}

/// Payload of a figure-like tag (figure, table, listing).
#[derive(Debug, Default)]
pub struct FigureTag {
    /// Numbering style key; the renumbering counter is scoped by it.
    pub style: String,
    /// (section, position) assigned exactly once by the renumbering pass.
    numbers: RwLock<Option<(u32, u32)>>,
}

impl FigureTag {
    /// Create a figure payload with the given style key.
    #[must_use]
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            numbers: RwLock::new(None),
        }
    }

    /// The assigned (section, position) numbers, if numbering has run.
    #[must_use]
    pub fn numbers(&self) -> Option<(u32, u32)> {
        *self.numbers.read().unwrap()
    }

    /// Assign numbers. The first assignment wins; repeated passes keep
    /// the original numbers so renumbering stays idempotent.
    pub(crate) fn assign_numbers(&self, section: u32, pos: u32) {
        let mut guard = self.numbers.write().unwrap();
        if guard.is_none() {
            *guard = Some((section, pos));
        }
    }
}

/// Payload of a cross-reference tag.
#[derive(Debug, Default)]
pub struct RefTag {
    /// Live pointer to the resolved figure, set by the renumbering pass.
    target: RwLock<Option<Weak<Node>>>,
    /// Resolved display label (e.g. "Figure 2.1").
    label: RwLock<Option<String>>,
}

impl RefTag {
    /// The resolved figure, if the reference has been rewired.
    #[must_use]
    pub fn target(&self) -> Option<Weak<Node>> {
        self.target.read().unwrap().clone()
    }

    /// The resolved display label, if the reference has been rewired.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.label.read().unwrap().clone()
    }

    pub(crate) fn resolve(&self, target: Weak<Node>, label: String) {
        *self.target.write().unwrap() = Some(target);
        *self.label.write().unwrap() = Some(label);
    }
}

/// Payload of a command tag.
#[derive(Debug)]
pub struct CmdTag {
    /// The command line, run through the shell.
    pub command: String,
    /// Working directory relative to the document root, if overridden.
    pub dir: Option<String>,
    /// Exit code considered success.
    pub expected_exit: i32,
    /// Whether the result may be persisted in the on-disk cache.
    pub cache: bool,
    /// Document variable to capture stdout into, if any.
    pub into_var: Option<String>,
}

/// Payload of a variable tag: either a definition or a reference.
#[derive(Debug)]
pub struct VarTag {
    /// The variable's name.
    pub name: String,
    /// True for definitions (`<var name=… value=…>`), false for
    /// references (`<var name=…/>`).
    pub is_definition: bool,
    /// A definition's value, or a reference's resolved value.
    value: RwLock<Option<String>>,
}

impl VarTag {
    /// Create a definition or reference payload.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        let is_definition = value.is_some();
        Self {
            name: name.into(),
            is_definition,
            value: RwLock::new(value),
        }
    }

    /// The definition's value, or a reference's resolved value.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.value.read().unwrap().clone()
    }

    pub(crate) fn resolve(&self, value: String) {
        *self.value.write().unwrap() = Some(value);
    }
}

/// Payload of a page tag.
#[derive(Debug, Default)]
pub struct PageTag {
    /// Title resolved from the page's first heading at PostParse.
    title: RwLock<Option<String>>,
}

impl PageTag {
    /// The page's resolved title, once the full tree has been seen.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.title.read().unwrap().clone()
    }

    pub(crate) fn resolve_title(&self, title: String) {
        *self.title.write().unwrap() = Some(title);
    }
}

/// Which table cell flavor an element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Header cell (`<th>`).
    Header,
    /// Data cell (`<td>`).
    Data,
}

/// The closed set of specialized tag variants.
#[derive(Debug)]
pub enum TagSpec {
    /// Plain element with no specialized behavior.
    Generic,
    /// The document root.
    Document,
    /// A page boundary.
    Page(PageTag),
    /// A heading (`h1`–`h6`).
    Heading(u8),
    /// The document title element.
    Title,
    /// Code in any of its flavors.
    Code(CodeTag),
    /// A numbered, captioned block.
    Figure(FigureTag),
    /// A figure's caption.
    Figcaption,
    /// A cross-reference to a figure.
    Ref(RefTag),
    /// An external command.
    Cmd(CmdTag),
    /// The captured result a command injects.
    CmdResult,
    /// A variable definition or reference.
    Var(VarTag),
    /// An include of another document.
    Include,
    /// A table cell.
    Cell(CellKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_figure_numbers_assigned_once() {
        let fig = FigureTag::new("figure");
        assert_eq!(fig.numbers(), None);

        fig.assign_numbers(1, 3);
        assert_eq!(fig.numbers(), Some((1, 3)));

        // A repeated pass must not renumber
        fig.assign_numbers(2, 9);
        assert_eq!(fig.numbers(), Some((1, 3)));
    }

    #[test]
    fn test_var_definition_vs_reference() {
        let def = VarTag::new("version", Some("1.2".to_owned()));
        let reference = VarTag::new("version", None);

        assert!(def.is_definition);
        assert_eq!(def.value(), Some("1.2".to_owned()));
        assert!(!reference.is_definition);
        assert_eq!(reference.value(), None);

        reference.resolve("1.2".to_owned());
        assert_eq!(reference.value(), Some("1.2".to_owned()));
    }

    #[test]
    fn test_page_title_resolution() {
        let page = PageTag::default();
        assert_eq!(page.title(), None);

        page.resolve_title("Chapter One".to_owned());
        assert_eq!(page.title(), Some("Chapter One".to_owned()));
    }
}
