//! The lifecycle pipeline: stage orchestration and the execution engine.
//!
//! PreParse and Parse run inside [`Parser::parse_file`](crate::Parser);
//! this module owns the remaining stages. PostParse, PreExecute, and
//! PostExecute are sequential depth-first walks and therefore
//! deterministic. Execute is the only concurrent stage: every node
//! implementing the Execute capability becomes an independent unit of
//! work on a bounded scheduler.
//!
//! # Execute-stage rules
//!
//! - Sibling subtrees run with no relative ordering guarantee.
//! - A node's own execute must finish — returning its replacement
//!   children — before those children are committed and walked, because
//!   the mutation changes what exists to execute.
//! - The first failing unit decides the aggregate outcome.
//!   Already-running siblings finish, but their results are discarded
//!   rather than committed.
//! - Workers observe the caller's [`ExecContext`] at every unit start;
//!   in-flight child processes are killed on cancellation.

use std::sync::Mutex;

use folio_cmd::{CmdRequest, ExecContext};

use crate::document::Document;
use crate::error::{EngineError, ExecError, HookError, Stage};
use crate::tree::{Atom, Capability, Element, Node, NodeRef, TagSpec, walk};

/// Worker count used when the host does not choose one.
const DEFAULT_WORKERS: usize = 8;

/// The Execute-stage scheduler.
///
/// Injectable so tests can substitute the deterministic sequential
/// scheduler; the bounded scheduler runs units on a rayon pool of the
/// given size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheduler {
    /// Run units one at a time, depth-first. Deterministic.
    Sequential,
    /// Run units on a bounded worker pool.
    Bounded(usize),
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::Bounded(DEFAULT_WORKERS)
    }
}

impl Document {
    /// Run PreExecute, Execute, and PostExecute in order.
    ///
    /// A document executes at most once; hosts that need a fresh run
    /// re-parse (see [`ExecError::AlreadyExecuted`]).
    ///
    /// # Errors
    ///
    /// Returns the stage-classified [`EngineError`]; a canceled or
    /// timed-out run satisfies [`EngineError::is_interrupted`].
    pub fn execute(&self, ctx: &ExecContext) -> Result<(), EngineError> {
        if self.mark_executed() {
            return Err(EngineError::PreExecute {
                file: self.filename().to_owned(),
                source: ExecError::AlreadyExecuted,
            });
        }

        tracing::debug!(file = self.filename(), "executing document");
        run_pre_execute(self, ctx)?;
        let outcome = run_execute(self, ctx);
        run_post_execute(self, ctx, outcome)
    }
}

/// Stage 3: sequential document-order walk of PostParse hooks.
///
/// Hooks run even when the preceding stage failed; a hook's own failure
/// combines with the incoming error instead of replacing it.
pub(crate) fn run_post_parse(
    doc: &Document,
    prior: Option<EngineError>,
) -> Result<(), EngineError> {
    let mut current = prior;
    for node in collect_capable(doc, Capability::PostParse) {
        let Some(el) = node.as_element() else {
            continue;
        };
        if let Err(fault) = post_parse_element(el, &node, doc) {
            current = Some(EngineError::PostParse(HookError::new(
                Stage::PostParse,
                hook_id(el, doc),
                ExecError::Invalid(fault),
                current.take(),
            )));
        }
    }
    current.map_or(Ok(()), Err)
}

/// Stage 4: sequential, fail-fast validation walk.
fn run_pre_execute(doc: &Document, ctx: &ExecContext) -> Result<(), EngineError> {
    let wrap = |source: ExecError| EngineError::PreExecute {
        file: doc.filename().to_owned(),
        source,
    };
    ctx.check().map_err(|i| wrap(ExecError::Interrupted(i)))?;

    fn visit(doc: &Document, node: &NodeRef) -> Result<(), ExecError> {
        if let Some(el) = node.as_element()
            && el.implements(Capability::PreExecute)
        {
            pre_execute_element(el, doc)?;
        }
        for child in node.children() {
            visit(doc, &child)?;
        }
        Ok(())
    }

    visit(doc, doc.root()).map_err(wrap)
}

/// First failure recorded during the Execute stage.
///
/// Commits take this lock too, so a unit finishing after the failure can
/// never slip its children into the tree.
type FailCell = Mutex<Option<ExecError>>;

fn record_failure(fail: &FailCell, source: ExecError) {
    let mut guard = fail.lock().unwrap();
    if guard.is_none() {
        *guard = Some(source);
    }
}

/// Stage 5: the concurrent execution walk.
fn run_execute(doc: &Document, ctx: &ExecContext) -> Result<(), EngineError> {
    let wrap = |source: ExecError| EngineError::Execute {
        file: doc.filename().to_owned(),
        root: doc.root_label().to_owned(),
        source,
    };

    let fail: FailCell = Mutex::new(None);
    match doc.scheduler() {
        Scheduler::Sequential => {
            for child in doc.body() {
                execute_unit_sequential(doc, &child, ctx, &fail);
            }
        }
        Scheduler::Bounded(workers) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(*workers)
                .build()
                .map_err(|e| wrap(ExecError::Scheduler(e.to_string())))?;
            pool.scope(|scope| {
                for child in doc.body() {
                    spawn_unit(scope, doc, child, ctx, &fail);
                }
            });
        }
    }

    let source = fail.into_inner().unwrap();
    source.map_or(Ok(()), |source| Err(wrap(source)))
}

fn spawn_unit<'s>(
    scope: &rayon::Scope<'s>,
    doc: &'s Document,
    node: NodeRef,
    ctx: &'s ExecContext,
    fail: &'s FailCell,
) {
    scope.spawn(move |scope| execute_unit_concurrent(scope, doc, &node, ctx, fail));
}

fn execute_unit_concurrent<'s>(
    scope: &rayon::Scope<'s>,
    doc: &'s Document,
    node: &NodeRef,
    ctx: &'s ExecContext,
    fail: &'s FailCell,
) {
    if !execute_unit(doc, node, ctx, fail) {
        return;
    }
    for child in node.children() {
        spawn_unit(scope, doc, child, ctx, fail);
    }
}

fn execute_unit_sequential(doc: &Document, node: &NodeRef, ctx: &ExecContext, fail: &FailCell) {
    if !execute_unit(doc, node, ctx, fail) {
        return;
    }
    for child in node.children() {
        execute_unit_sequential(doc, &child, ctx, fail);
    }
}

/// Run one unit of work. Returns whether the walk should descend into
/// the node's (possibly just-committed) children.
fn execute_unit(doc: &Document, node: &NodeRef, ctx: &ExecContext, fail: &FailCell) -> bool {
    if fail.lock().unwrap().is_some() {
        return false;
    }
    if let Err(interrupt) = ctx.check() {
        record_failure(fail, ExecError::Interrupted(interrupt));
        return false;
    }

    if let Some(el) = node.as_element()
        && el.implements(Capability::Execute)
    {
        match execute_element(el, doc, ctx) {
            Ok(Some(children)) => {
                // Overall failure discards finished siblings' results;
                // the fail lock is held across the commit so the check
                // cannot race a sibling recording the first failure
                let guard = fail.lock().unwrap();
                if guard.is_some() {
                    return false;
                }
                el.set_children(children);
            }
            Ok(None) => {}
            Err(source) => {
                record_failure(fail, source);
                return false;
            }
        }
    }
    true
}

/// Capability dispatch for the Execute stage.
fn execute_element(
    el: &Element,
    doc: &Document,
    ctx: &ExecContext,
) -> Result<Option<Vec<NodeRef>>, ExecError> {
    match el.spec() {
        TagSpec::Cmd(cmd) => {
            let dir = cmd.dir.as_ref().map_or_else(
                || doc.work_dir().to_path_buf(),
                |d| doc.work_dir().join(d),
            );
            let request = CmdRequest::new(cmd.command.clone(), dir)
                .expected_exit(cmd.expected_exit)
                .cached(cmd.cache);

            let output = doc.runner().run(&request, ctx)?;

            if let Some(name) = &cmd.into_var {
                doc.set_var(name.clone(), output.stdout.trim_end().to_owned());
            }

            // The command replaces its own children with the result node
            let result = Element::with_spec(Atom::new("cmdresult"), TagSpec::CmdResult);
            result.push_child(Node::text(output.stdout));
            Ok(Some(vec![Node::element(result)]))
        }
        _ => Ok(None),
    }
}

/// Capability dispatch for the PreExecute stage.
fn pre_execute_element(el: &Element, doc: &Document) -> Result<(), ExecError> {
    match el.spec() {
        TagSpec::Cmd(cmd) => {
            if let Some(dir) = &cmd.dir {
                let resolved = doc.work_dir().join(dir);
                if !resolved.is_dir() {
                    return Err(ExecError::Invalid(format!(
                        "cmd dir {dir:?} does not exist"
                    )));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Stage 6: sequential document-order walk of PostExecute hooks.
///
/// Same contract shape as PostParse: hooks see the execution outcome and
/// their failures combine with it, never replace it.
fn run_post_execute(
    doc: &Document,
    _ctx: &ExecContext,
    outcome: Result<(), EngineError>,
) -> Result<(), EngineError> {
    let mut current = outcome.err();
    for node in collect_capable(doc, Capability::PostExecute) {
        let Some(el) = node.as_element() else {
            continue;
        };
        if let Err(fault) = post_execute_element(el, doc) {
            current = Some(EngineError::PostExecute(HookError::new(
                Stage::PostExecute,
                hook_id(el, doc),
                ExecError::Invalid(fault),
                current.take(),
            )));
        }
    }
    current.map_or(Ok(()), Err)
}

/// Capability dispatch for the PostParse stage.
fn post_parse_element(el: &Element, node: &NodeRef, doc: &Document) -> Result<(), String> {
    match el.spec() {
        TagSpec::Page(page) => {
            // Late repair: the page's title needs the full tree
            let mut title = None;
            walk(node, &mut |descendant| {
                if title.is_none()
                    && let Some(inner) = descendant.as_element()
                    && matches!(inner.spec(), TagSpec::Heading(_))
                {
                    title = Some(descendant.text_content().trim().to_owned());
                }
            });
            if let Some(title) = title {
                page.resolve_title(title);
            }
            Ok(())
        }
        TagSpec::Var(var) if var.is_definition => {
            doc.set_var(var.name.clone(), var.value().unwrap_or_default());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Capability dispatch for the PostExecute stage.
fn post_execute_element(el: &Element, doc: &Document) -> Result<(), String> {
    match el.spec() {
        TagSpec::Var(var) if !var.is_definition => {
            // Resolve once sibling-produced data (command captures,
            // definitions) exists
            match doc.var(&var.name) {
                Some(value) => {
                    var.resolve(value);
                    Ok(())
                }
                None => Err(format!("unknown variable {:?}", var.name)),
            }
        }
        _ => Ok(()),
    }
}

/// Snapshot, in document order, of the nodes implementing a capability.
fn collect_capable(doc: &Document, capability: Capability) -> Vec<NodeRef> {
    let mut nodes = Vec::new();
    walk(doc.root(), &mut |node| {
        if let Some(el) = node.as_element()
            && el.implements(capability)
        {
            nodes.push(std::sync::Arc::clone(node));
        }
    });
    nodes
}

fn hook_id(el: &Element, doc: &Document) -> String {
    format!("{}@{}", el.atom(), doc.filename())
}
