//! The node/tag data model.
//!
//! A document tree is built from [`Node`]s behind [`NodeRef`] handles.
//! Text nodes are leaves; [`Element`]s carry an immutable [`Atom`], an
//! attribute map, a child sequence, and a [`TagSpec`] variant payload.
//!
//! # Locking
//!
//! Attribute map and child sequence each sit behind the element's own
//! `RwLock` because the Execute stage reads and writes them from
//! concurrent workers. Every accessor acquires only its own element's
//! lock and returns owned snapshots — no method ever holds two locks at
//! once, so no lock-ordering hazards can arise between nodes.

mod atom;
mod serialize;
mod spec;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

pub use atom::Atom;
pub use serialize::escape_html;
pub use spec::{
    CellKind, CmdTag, CodeKind, CodeTag, FigureTag, PageTag, RefTag, TagSpec, VarTag,
};

/// Reference-counted handle to a node.
pub type NodeRef = Arc<Node>;

/// Optional lifecycle behaviors a tag may implement.
///
/// Capability checks are explicit per-variant matches; a node that does
/// not implement a capability is silently skipped by that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Repair hook after the full tree is built.
    PostParse,
    /// Validation before concurrent execution begins.
    PreExecute,
    /// A unit of work in the concurrent Execute stage.
    Execute,
    /// Fixup hook after execution completes.
    PostExecute,
    /// Final display-text resolution once numbering has run.
    Finalize,
}

/// A required attribute was missing or empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttrError {
    /// The attribute is not present at all.
    #[error("attribute {name:?} not found")]
    NotFound {
        /// The requested attribute name.
        name: String,
    },
    /// The attribute is present but empty.
    #[error("attribute {name:?} is empty")]
    Empty {
        /// The requested attribute name.
        name: String,
    },
}

/// The smallest unit of a document tree.
#[derive(Debug)]
pub enum Node {
    /// Literal text.
    Text(String),
    /// A tag with attributes, children, and specialized behavior.
    Element(Element),
}

impl Node {
    /// Create a text node handle.
    #[must_use]
    pub fn text(content: impl Into<String>) -> NodeRef {
        Arc::new(Self::Text(content.into()))
    }

    /// Create an element node handle.
    #[must_use]
    pub fn element(element: Element) -> NodeRef {
        Arc::new(Self::Element(element))
    }

    /// This node's element, if it is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    /// Ordered snapshot of this node's children (empty for text).
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        match self {
            Self::Element(el) => el.children(),
            Self::Text(_) => Vec::new(),
        }
    }

    /// Whether this node has no content.
    ///
    /// For most nodes that means no non-whitespace text anywhere in the
    /// subtree; variants whose notion of content differs override it (a
    /// command tag with a command string is never blank, nor is a
    /// command's injected result).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Element(el) => match el.spec() {
                TagSpec::Cmd(_) | TagSpec::CmdResult => false,
                _ => el.children().iter().all(|child| child.is_blank()),
            },
        }
    }

    /// Concatenated text of this node and all descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Element(el) => el
                .children()
                .iter()
                .map(|child| child.text_content())
                .collect(),
        }
    }

    /// Serialize this node and all descendants as HTML.
    #[must_use]
    pub fn to_html(&self) -> String {
        serialize::to_html(self)
    }

    /// Serialize this node and all descendants as Markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        serialize::to_markdown(self)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_html())
    }
}

/// A tag: atom identity, attributes, children, and a variant payload.
#[derive(Debug)]
pub struct Element {
    atom: Atom,
    attrs: RwLock<BTreeMap<String, String>>,
    children: RwLock<Vec<NodeRef>>,
    spec: TagSpec,
}

impl Element {
    /// Create a generic element.
    #[must_use]
    pub fn new(atom: Atom) -> Self {
        Self::with_spec(atom, TagSpec::Generic)
    }

    /// Create an element with a specialized variant payload.
    #[must_use]
    pub fn with_spec(atom: Atom, spec: TagSpec) -> Self {
        Self {
            atom,
            attrs: RwLock::new(BTreeMap::new()),
            children: RwLock::new(Vec::new()),
            spec,
        }
    }

    /// The element's atom. Immutable after construction.
    #[must_use]
    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// The element's variant payload.
    #[must_use]
    pub fn spec(&self) -> &TagSpec {
        &self.spec
    }

    /// Look up an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs.read().unwrap().get(name).cloned()
    }

    /// Look up an attribute that must be present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`AttrError::NotFound`] or [`AttrError::Empty`], so
    /// callers distinguish the two without checking twice.
    pub fn require_attr(&self, name: &str) -> Result<String, AttrError> {
        match self.attr(name) {
            None => Err(AttrError::NotFound {
                name: name.to_owned(),
            }),
            Some(value) if value.is_empty() => Err(AttrError::Empty {
                name: name.to_owned(),
            }),
            Some(value) => Ok(value),
        }
    }

    /// Set an attribute.
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs
            .write()
            .unwrap()
            .insert(name.into(), value.into());
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attr(&self, name: &str) -> Option<String> {
        self.attrs.write().unwrap().remove(name)
    }

    /// Snapshot of all attributes, sorted by name.
    #[must_use]
    pub fn attrs(&self) -> BTreeMap<String, String> {
        self.attrs.read().unwrap().clone()
    }

    /// Replace all attributes.
    pub fn set_attrs(&self, attrs: BTreeMap<String, String>) {
        *self.attrs.write().unwrap() = attrs;
    }

    /// Ordered snapshot of the element's children.
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        self.children.read().unwrap().clone()
    }

    /// Replace the element's children.
    pub fn set_children(&self, children: Vec<NodeRef>) {
        *self.children.write().unwrap() = children;
    }

    /// Append a child.
    pub fn push_child(&self, child: NodeRef) {
        self.children.write().unwrap().push(child);
    }

    /// Concatenated text of this element's descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.children()
            .iter()
            .map(|child| child.text_content())
            .collect()
    }

    /// Whether this element implements the given lifecycle capability.
    #[must_use]
    pub fn implements(&self, capability: Capability) -> bool {
        match (&self.spec, capability) {
            // Pages resolve their title once the full tree is visible;
            // variable definitions register themselves then too
            (TagSpec::Page(_), Capability::PostParse) => true,
            (TagSpec::Var(var), Capability::PostParse) => var.is_definition,
            // Commands validate before and run during execution
            (TagSpec::Cmd(_), Capability::PreExecute | Capability::Execute) => true,
            // Variable references resolve after sibling-produced data
            // (command captures) exists
            (TagSpec::Var(var), Capability::PostExecute) => !var.is_definition,
            // References bake their display text once numbering ran
            (TagSpec::Ref(_), Capability::Finalize) => true,
            _ => false,
        }
    }

    /// The source files backing this element, if it has any.
    ///
    /// Code tags report their extraction sources; includes and
    /// source-backed figures report their `src` attribute.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        match &self.spec {
            TagSpec::Code(code) => code.sources.clone(),
            TagSpec::Include | TagSpec::Figure(_) => {
                self.attr("src").into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Walk a subtree depth-first in document order, pre-order.
pub fn walk(node: &NodeRef, visit: &mut impl FnMut(&NodeRef)) {
    visit(node);
    for child in node.children() {
        walk(&child, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(atom: &str) -> Element {
        Element::new(Atom::new(atom))
    }

    #[test]
    fn test_text_node_is_leaf() {
        let node = Node::text("hello");

        assert!(node.children().is_empty());
        assert!(node.as_element().is_none());
        assert_eq!(node.text_content(), "hello");
    }

    #[test]
    fn test_element_children_snapshot() {
        let el = element("p");
        el.push_child(Node::text("a"));
        el.push_child(Node::text("b"));
        let node = Node::element(el);

        let children = node.children();
        assert_eq!(children.len(), 2);
        assert_eq!(node.text_content(), "ab");
    }

    #[test]
    fn test_require_attr_distinguishes_missing_and_empty() {
        let el = element("code");
        el.set_attr("src", "");

        assert_eq!(
            el.require_attr("snippet"),
            Err(AttrError::NotFound {
                name: "snippet".to_owned()
            })
        );
        assert_eq!(
            el.require_attr("src"),
            Err(AttrError::Empty {
                name: "src".to_owned()
            })
        );

        el.set_attr("src", "main.rs");
        assert_eq!(el.require_attr("src").unwrap(), "main.rs");
    }

    #[test]
    fn test_attr_roundtrip() {
        let el = element("figure");
        el.set_attr("id", "fig-1");

        assert_eq!(el.attr("id"), Some("fig-1".to_owned()));
        assert_eq!(el.remove_attr("id"), Some("fig-1".to_owned()));
        assert_eq!(el.attr("id"), None);
    }

    #[test]
    fn test_is_blank_text() {
        assert!(Node::text("  \n ").is_blank());
        assert!(!Node::text("x").is_blank());
    }

    #[test]
    fn test_is_blank_element_recurses() {
        let el = element("p");
        el.push_child(Node::text("   "));
        let node = Node::element(el);
        assert!(node.is_blank());

        let el = element("p");
        el.push_child(Node::text("content"));
        assert!(!Node::element(el).is_blank());
    }

    #[test]
    fn test_cmd_emptiness_is_custom() {
        // A command has no text children yet is never "no content"
        let el = Element::with_spec(
            Atom::new("cmd"),
            TagSpec::Cmd(CmdTag {
                command: "ls".to_owned(),
                dir: None,
                expected_exit: 0,
                cache: false,
                into_var: None,
            }),
        );

        assert!(!Node::element(el).is_blank());
    }

    #[test]
    fn test_capability_dispatch() {
        let cmd = Element::with_spec(
            Atom::new("cmd"),
            TagSpec::Cmd(CmdTag {
                command: "ls".to_owned(),
                dir: None,
                expected_exit: 0,
                cache: false,
                into_var: None,
            }),
        );
        assert!(cmd.implements(Capability::Execute));
        assert!(cmd.implements(Capability::PreExecute));
        assert!(!cmd.implements(Capability::PostParse));

        let generic = element("p");
        for capability in [
            Capability::PostParse,
            Capability::PreExecute,
            Capability::Execute,
            Capability::PostExecute,
            Capability::Finalize,
        ] {
            assert!(!generic.implements(capability));
        }

        let var_def = Element::with_spec(
            Atom::new("var"),
            TagSpec::Var(VarTag::new("v", Some("1".to_owned()))),
        );
        let var_ref = Element::with_spec(Atom::new("var"), TagSpec::Var(VarTag::new("v", None)));
        assert!(var_def.implements(Capability::PostParse));
        assert!(!var_def.implements(Capability::PostExecute));
        assert!(var_ref.implements(Capability::PostExecute));
        assert!(!var_ref.implements(Capability::PostParse));
    }

    #[test]
    fn test_atom_identity_is_immutable() {
        let el = element("figure");
        // The only way to observe the atom is the accessor; there is no
        // setter to misuse
        assert_eq!(*el.atom(), "figure");
    }

    #[test]
    fn test_walk_is_document_order() {
        let inner = element("em");
        inner.push_child(Node::text("x"));
        let p = element("p");
        p.push_child(Node::element(inner));
        p.push_child(Node::text("y"));
        let root = Node::element(p);

        let mut visited = Vec::new();
        walk(&root, &mut |node| {
            visited.push(match &**node {
                Node::Text(t) => t.clone(),
                Node::Element(el) => el.atom().to_string(),
            });
        });

        assert_eq!(visited, vec!["p", "em", "x", "y"]);
    }

    #[test]
    fn test_sources_for_code() {
        let el = Element::with_spec(
            Atom::new("code"),
            TagSpec::Code(CodeTag {
                kind: CodeKind::Source,
                lang: Some("rust".to_owned()),
                sources: vec!["main.rs".to_owned()],
            }),
        );

        assert_eq!(el.sources(), vec!["main.rs".to_owned()]);
    }
}
