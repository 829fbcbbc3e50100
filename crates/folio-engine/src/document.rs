//! The document: tree root plus the runtime it executes against.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use folio_cmd::CommandRunner;
use folio_storage::Storage;

use crate::pipeline::Scheduler;
use crate::tree::{NodeRef, TagSpec, walk};

/// Title used when a document has neither a `<title>` nor an `<h1>`.
const DEFAULT_TITLE: &str = "Untitled";

/// A fully parsed document tree and everything its execution needs.
///
/// Documents are produced by [`Parser::parse_file`](crate::Parser) and
/// are single-use: one parse, at most one
/// [`execute`](Document::execute), then serialization. Document-level
/// shared state (the variable table, the lazily computed title) sits
/// behind the document's own locks because concurrent Execute workers
/// may touch it.
pub struct Document {
    root: NodeRef,
    filename: String,
    root_label: String,
    work_dir: PathBuf,
    storage: Arc<dyn Storage>,
    runner: Arc<CommandRunner>,
    scheduler: Scheduler,
    vars: RwLock<BTreeMap<String, String>>,
    title: OnceLock<String>,
    executed: AtomicBool,
}

impl Document {
    pub(crate) fn new(
        root: NodeRef,
        filename: String,
        root_label: String,
        work_dir: PathBuf,
        storage: Arc<dyn Storage>,
        runner: Arc<CommandRunner>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            root,
            filename,
            root_label,
            work_dir,
            storage,
            runner,
            scheduler,
            vars: RwLock::new(BTreeMap::new()),
            title: OnceLock::new(),
            executed: AtomicBool::new(false),
        }
    }

    /// The tree root. Its children are the document body.
    #[must_use]
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Ordered snapshot of the document's top-level nodes.
    #[must_use]
    pub fn body(&self) -> Vec<NodeRef> {
        self.root.children()
    }

    /// All page elements, in document order.
    #[must_use]
    pub fn pages(&self) -> Vec<NodeRef> {
        let mut pages = Vec::new();
        walk(&self.root, &mut |node| {
            if let Some(el) = node.as_element()
                && matches!(el.spec(), TagSpec::Page(_))
            {
                pages.push(Arc::clone(node));
            }
        });
        pages
    }

    /// The document title.
    ///
    /// Computed once, lazily, from the fully built tree: the first
    /// `<title>` element wins, else the first `<h1>`, else a default.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.get_or_init(|| {
            let mut title: Option<String> = None;
            let mut fallback: Option<String> = None;
            walk(&self.root, &mut |node| {
                let Some(el) = node.as_element() else {
                    return;
                };
                match el.spec() {
                    TagSpec::Title if title.is_none() => {
                        title = Some(node.text_content().trim().to_owned());
                    }
                    TagSpec::Heading(1) if fallback.is_none() => {
                        fallback = Some(node.text_content().trim().to_owned());
                    }
                    _ => {}
                }
            });
            title
                .or(fallback)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_owned())
        })
    }

    /// Serialize the document body as HTML.
    #[must_use]
    pub fn to_html(&self) -> String {
        self.body().iter().map(|node| node.to_html()).collect()
    }

    /// Serialize the document body as Markdown, with `---` separators
    /// between pages.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let mut seen_page = false;
        for node in self.body() {
            let is_page = node
                .as_element()
                .is_some_and(|el| matches!(el.spec(), TagSpec::Page(_)));
            if is_page && seen_page {
                out.push_str("---\n\n");
            }
            seen_page |= is_page;
            out.push_str(&node.to_markdown());
        }
        out
    }

    /// Look up a document variable.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<String> {
        self.vars.read().unwrap().get(name).cloned()
    }

    /// Set a document variable. Callable from concurrent Execute workers;
    /// guarded by the document's own lock.
    pub fn set_var(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.write().unwrap().insert(name.into(), value.into());
    }

    /// The source file this document was parsed from.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Display label of the storage root the parse was scoped to.
    #[must_use]
    pub fn root_label(&self) -> &str {
        &self.root_label
    }

    /// On-disk working directory commands run in.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The storage view this document was parsed out of. Hosts use it to
    /// resolve assets next to the document.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub(crate) fn runner(&self) -> &Arc<CommandRunner> {
        &self.runner
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Flip the executed flag, returning whether it was already set.
    pub(crate) fn mark_executed(&self) -> bool {
        self.executed.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("filename", &self.filename)
            .field("root", &self.root_label)
            .finish_non_exhaustive()
    }
}
