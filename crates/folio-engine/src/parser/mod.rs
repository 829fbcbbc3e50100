//! The parser: bytes in, typed document tree out.
//!
//! A [`Parser`] is scoped to one storage root. `parse_file` reads through
//! the virtual filesystem (never `std::fs`), runs the PreParse transform
//! chain, feeds the result through the tokenizer, and dispatches every
//! element through the atom→constructor registry. Includes and
//! source-backed figures sub-parse with a storage subview rooted at the
//! included path's directory, inheriting this parser's registry and
//! snippet conventions.
//!
//! The registry is owned per parser instance: concurrent independent
//! parses never observe each other's custom tags.

mod builder;
mod construct;
mod preparse;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use folio_cache::CacheBucket;
use folio_cmd::CommandRunner;
use folio_snippets::Conventions;
use folio_storage::{FsStorage, Storage};

pub use construct::TagParts;
pub use preparse::PreParse;

use crate::document::Document;
use crate::error::{EngineError, ParseError, TagError};
use crate::parser::preparse::{MarkdownConvert, VarSubstitution};
use crate::pipeline::{Scheduler, run_post_parse};
use crate::tree::{Atom, Element, Node, NodeRef, TagSpec};

/// Includes nested deeper than this abort the parse.
const MAX_INCLUDE_DEPTH: usize = 32;

/// A registered tag constructor.
///
/// Receives the element's parts (children already resolved) and produces
/// the typed node, or a construction failure that surfaces as a Parse
/// error for the enclosing document.
pub type TagConstructor =
    Arc<dyn Fn(&BuildContext<'_>, TagParts) -> Result<NodeRef, TagError> + Send + Sync>;

/// What a tag constructor can see of the parser.
pub struct BuildContext<'a> {
    parser: &'a Parser,
}

impl BuildContext<'_> {
    /// The storage view this parse is scoped to.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.parser.storage
    }

    /// The snippet-comment conventions in effect.
    #[must_use]
    pub fn conventions(&self) -> &Conventions {
        &self.parser.conventions
    }

    pub(crate) fn constructor(&self, atom: &str) -> Option<&TagConstructor> {
        self.parser.registry.get(atom)
    }

    /// Sub-parse a document scoped to `path`'s directory.
    ///
    /// The sub-parser inherits this parser's registry, conventions, and
    /// variables; relative references inside the included document
    /// resolve against its own directory.
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] when the file is missing, the subview cannot
    /// be created, nesting is too deep, or the sub-parse itself fails.
    pub fn subparse(&self, path: &str) -> Result<Vec<NodeRef>, TagError> {
        let parser = self.parser;
        if parser.depth >= MAX_INCLUDE_DEPTH {
            return Err(TagError::Invalid(format!(
                "include depth exceeded at {path:?}"
            )));
        }
        if !parser.storage.exists(path) {
            return Err(TagError::MissingSource {
                path: path.to_owned(),
            });
        }

        let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
        let sub = if dir.is_empty() {
            parser.subparser(Arc::clone(&parser.storage), parser.root_label.clone(), PathBuf::new())
        } else {
            let storage = parser.storage.subview(dir)?;
            parser.subparser(storage, format!("{}/{dir}", parser.root_label), PathBuf::from(dir))
        };

        let doc = sub.parse_file(file).map_err(|e| TagError::Include {
            path: path.to_owned(),
            source: Box::new(e),
        })?;
        Ok(doc.body())
    }
}

/// Parses folio documents out of one storage root.
pub struct Parser {
    storage: Arc<dyn Storage>,
    root_label: String,
    work_dir: PathBuf,
    registry: HashMap<String, TagConstructor>,
    conventions: Conventions,
    vars: BTreeMap<String, String>,
    extra_preparse: Vec<Arc<dyn PreParse>>,
    runner: Arc<CommandRunner>,
    scheduler: Scheduler,
    depth: usize,
}

impl Parser {
    /// Create a parser over the given storage view.
    ///
    /// Commands executed by documents from this parser run in the
    /// current process working directory; use [`Parser::from_dir`] or
    /// [`Parser::set_work_dir`] to scope them.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            root_label: ".".to_owned(),
            work_dir: PathBuf::from("."),
            registry: HashMap::new(),
            conventions: Conventions::default(),
            vars: BTreeMap::new(),
            extra_preparse: Vec::new(),
            runner: Arc::new(CommandRunner::without_cache()),
            scheduler: Scheduler::default(),
            depth: 0,
        }
    }

    /// Create a parser rooted at an on-disk directory.
    #[must_use]
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut parser = Self::new(Arc::new(FsStorage::new(dir.clone())));
        parser.root_label = dir.display().to_string();
        parser.work_dir = dir;
        parser
    }

    /// Register (or override) a tag constructor for an element name.
    ///
    /// This is the engine's sole extension point: host vocabularies add
    /// tags here without touching the built-in set. Registered names
    /// shadow built-ins.
    pub fn set_custom_tag(&mut self, name: impl Into<String>, constructor: TagConstructor) {
        self.registry
            .insert(name.into().to_ascii_lowercase(), constructor);
    }

    /// Set a variable for `{{ name }}` substitution during PreParse.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Append a transform to the PreParse chain (after variable
    /// substitution, before Markdown conversion).
    pub fn add_preparse(&mut self, transform: Arc<dyn PreParse>) {
        self.extra_preparse.push(transform);
    }

    /// Choose the Execute-stage scheduler for parsed documents.
    pub fn set_scheduler(&mut self, scheduler: Scheduler) {
        self.scheduler = scheduler;
    }

    /// Persist command results into the given cache bucket.
    pub fn set_command_cache(&mut self, bucket: Box<dyn CacheBucket>) {
        self.runner = Arc::new(CommandRunner::new(bucket));
    }

    /// Override the on-disk working directory commands run in.
    pub fn set_work_dir(&mut self, dir: impl Into<PathBuf>) {
        self.work_dir = dir.into();
    }

    /// The snippet-comment conventions, for host adjustment.
    pub fn conventions_mut(&mut self) -> &mut Conventions {
        &mut self.conventions
    }

    /// Parse a document read through the storage view.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PreParse`], [`EngineError::Parse`], or
    /// [`EngineError::PostParse`] carrying the offending filename and
    /// root. No partial document is returned on failure.
    pub fn parse_file(&self, name: &str) -> Result<Document, EngineError> {
        let content = self
            .storage
            .read(name)
            .map_err(|e| self.parse_error(name, ParseError::Storage(e)))?;
        self.parse_source(name, content)
    }

    /// Parse already-loaded content as if read from `name`.
    ///
    /// # Errors
    ///
    /// Same contract as [`Parser::parse_file`].
    pub fn parse_source(&self, name: &str, content: String) -> Result<Document, EngineError> {
        tracing::debug!(file = name, root = %self.root_label, "parsing document");

        // Stage 1: PreParse transform chain
        let substitution = VarSubstitution::new(self.vars.clone());
        let mut chain: Vec<&dyn PreParse> = vec![&substitution];
        for transform in &self.extra_preparse {
            chain.push(transform.as_ref());
        }
        let markdown = MarkdownConvert;
        chain.push(&markdown);

        let mut content = content;
        for transform in chain {
            content =
                transform
                    .apply(name, content)
                    .map_err(|source| EngineError::PreParse {
                        transform: transform.name().to_owned(),
                        file: name.to_owned(),
                        source,
                    })?;
        }

        // Stage 2: Parse
        let raw = builder::build_tree(&content).map_err(|e| self.parse_error(name, e))?;
        let ctx = BuildContext { parser: self };
        let children = raw
            .into_iter()
            .map(|node| construct::resolve(&ctx, node))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.parse_error(name, e))?;

        let root = Element::with_spec(Atom::new("document"), TagSpec::Document);
        root.set_children(children);
        let doc = Document::new(
            Node::element(root),
            name.to_owned(),
            self.root_label.clone(),
            self.work_dir.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.runner),
            self.scheduler.clone(),
        );

        // Stage 3: PostParse hooks over the full tree
        run_post_parse(&doc, None)?;
        Ok(doc)
    }

    /// A derived parser for a sub-parse, sharing registry and runtime.
    fn subparser(&self, storage: Arc<dyn Storage>, root_label: String, dir: PathBuf) -> Self {
        Self {
            storage,
            root_label,
            work_dir: self.work_dir.join(dir),
            registry: self.registry.clone(),
            conventions: self.conventions.clone(),
            vars: self.vars.clone(),
            extra_preparse: self.extra_preparse.clone(),
            runner: Arc::clone(&self.runner),
            scheduler: self.scheduler.clone(),
            depth: self.depth + 1,
        }
    }

    fn parse_error(&self, file: &str, source: ParseError) -> EngineError {
        EngineError::Parse {
            file: file.to_owned(),
            root: self.root_label.clone(),
            source,
        }
    }
}
