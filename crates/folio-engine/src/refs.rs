//! Figure numbering and cross-reference rewiring.
//!
//! A dedicated, sequential pass that runs after Execute — execution can
//! produce new figures, and numbering must reflect final document order
//! no matter how concurrently Execute ran. Counters live in the
//! [`RefProcessor`], not the tree, so hosts create a fresh processor per
//! full pass.
//!
//! For every figure-like tag the pass:
//!
//! 1. validates the caption (exactly one, non-empty),
//! 2. assigns (section, position) numbers exactly once,
//! 3. injects a generated "`Style section.pos:`" label into the caption,
//!    marked so repeated processing is a no-op,
//! 4. replaces the figure's id with a generated unique id and rewires
//!    every reference that matched the original id, handing it a live
//!    pointer to the figure.
//!
//! A single validation failure aborts the pass; the partially renumbered
//! tree must not be used.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::document::Document;
use crate::error::RefError;
use crate::tree::{Atom, Capability, Element, Node, NodeRef, TagSpec, walk};

/// Attribute marking a caption label as generated by this pass.
const LABEL_MARKER: &str = "data-figure-label";

/// Produces unique element ids for figure restriping.
pub trait IdGenerator: Send + Sync {
    /// Produce the next unique id.
    fn generate(&self) -> String;
}

/// Default [`IdGenerator`]: random v4 UUIDs with a `fig-` prefix.
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        format!("fig-{}", uuid::Uuid::new_v4())
    }
}

/// One full numbering pass over one document.
///
/// Counters are scoped by style key and, within a style, by document
/// section (a section starts at every `h1`). Both index accessors are
/// guarded, so reentrant use is safe even though the pass itself is
/// sequential by contract.
pub struct RefProcessor {
    counters: Mutex<HashMap<(String, u32), u32>>,
    section: AtomicU32,
    id_gen: Box<dyn IdGenerator>,
}

impl Default for RefProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RefProcessor {
    /// Create a processor with the default uuid id-generator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_generator(Box::new(UuidGenerator))
    }

    /// Create a processor with a custom id-generator (tests use a
    /// deterministic one).
    #[must_use]
    pub fn with_id_generator(id_gen: Box<dyn IdGenerator>) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            section: AtomicU32::new(0),
            id_gen,
        }
    }

    /// Increment and return the position counter for a style within the
    /// current section.
    pub fn next_index(&self, style: &str) -> u32 {
        let section = self.current_section();
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry((style.to_owned(), section)).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Peek the position counter for a style without incrementing.
    #[must_use]
    pub fn cur_index(&self, style: &str) -> u32 {
        let section = self.current_section();
        let counters = self.counters.lock().unwrap();
        counters
            .get(&(style.to_owned(), section))
            .copied()
            .unwrap_or(0)
    }

    /// The section counter, clamped so pre-section figures land in 1.
    fn current_section(&self) -> u32 {
        self.section.load(Ordering::Acquire).max(1)
    }

    /// Number every figure and rewire every reference in the document.
    ///
    /// # Errors
    ///
    /// Returns [`RefError`] on the first figure failing caption
    /// validation. The tree is left partially renumbered and must not be
    /// used by callers on error.
    pub fn process(&self, doc: &Document) -> Result<(), RefError> {
        // Collect figures (with their section) and references in final
        // document order
        let mut figures: Vec<(NodeRef, u32)> = Vec::new();
        let mut references: Vec<NodeRef> = Vec::new();
        walk(doc.root(), &mut |node| {
            let Some(el) = node.as_element() else {
                return;
            };
            match el.spec() {
                TagSpec::Heading(1) => {
                    self.section.fetch_add(1, Ordering::AcqRel);
                }
                TagSpec::Figure(_) => {
                    figures.push((Arc::clone(node), self.current_section()));
                }
                TagSpec::Ref(_) => references.push(Arc::clone(node)),
                _ => {}
            }
        });

        // Number figures, collecting (original id → rewired target)
        let mut rewired: Vec<(String, String, String, NodeRef)> = Vec::new();
        for (index, (node, section)) in figures.iter().enumerate() {
            let el = node.as_element().expect("figures are elements");
            let TagSpec::Figure(figure) = el.spec() else {
                unreachable!("collected figures carry figure specs");
            };

            let figure_id = el
                .attr("id")
                .unwrap_or_else(|| format!("figure-{}", index + 1));
            let caption = validate_caption(el, &figure_id)?;

            // First assignment wins; a repeated pass reuses the numbers
            let already_numbered = figure.numbers().is_some();
            let (section, pos) = figure.numbers().unwrap_or_else(|| {
                let pos = {
                    let mut counters = self.counters.lock().unwrap();
                    let counter = counters
                        .entry((figure.style.clone(), *section))
                        .or_insert(0);
                    *counter += 1;
                    *counter
                };
                figure.assign_numbers(*section, pos);
                (*section, pos)
            });

            let display = format!("{} {section}.{pos}", capitalize(&figure.style));
            inject_label(&caption, &format!("{display}:"));

            // Restripe the id once; a repeated pass keeps it stable
            let new_id = if already_numbered {
                figure_id.clone()
            } else {
                let id = self.id_gen.generate();
                el.set_attr("id", id.clone());
                id
            };
            rewired.push((figure_id, new_id, display, Arc::clone(node)));
        }

        // Rewire references matching each figure's original id
        for node in &references {
            let el = node.as_element().expect("references are elements");
            let Some(target_id) = el.attr("id") else {
                continue;
            };
            let Some((_, new_id, display, figure_node)) =
                rewired.iter().find(|(old, ..)| *old == target_id)
            else {
                continue;
            };

            el.set_attr("id", new_id.clone());
            if let TagSpec::Ref(reference) = el.spec() {
                reference.resolve(Arc::downgrade(figure_node), display.clone());
            }
            if el.implements(Capability::Finalize) {
                finalize_element(el);
            }
        }

        Ok(())
    }
}

/// Validate that a figure has exactly one non-empty caption; return it.
fn validate_caption(el: &Element, figure_id: &str) -> Result<NodeRef, RefError> {
    let captions: Vec<NodeRef> = el
        .children()
        .into_iter()
        .filter(|child| {
            child
                .as_element()
                .is_some_and(|inner| matches!(inner.spec(), TagSpec::Figcaption))
        })
        .collect();

    match captions.as_slice() {
        [] => Err(RefError::MissingCaption {
            id: figure_id.to_owned(),
        }),
        [caption] => {
            let caption_el = caption.as_element().expect("caption is an element");
            // Emptiness ignores a label injected by an earlier pass
            let has_content = caption_el.children().iter().any(|child| {
                !child.is_blank() && !is_label(child)
            });
            if has_content {
                Ok(Arc::clone(caption))
            } else {
                Err(RefError::EmptyCaption {
                    id: figure_id.to_owned(),
                })
            }
        }
        many => Err(RefError::MultipleCaptions {
            id: figure_id.to_owned(),
            count: many.len(),
        }),
    }
}

/// Prepend the generated label to a caption, exactly once.
fn inject_label(caption: &NodeRef, label: &str) {
    let caption_el = caption.as_element().expect("caption is an element");
    let children = caption_el.children();
    if children.first().is_some_and(is_label) {
        return;
    }

    let span = Element::new(Atom::new("span"));
    span.set_attr("class", "figure-label");
    span.set_attr(LABEL_MARKER, "1");
    span.push_child(Node::text(label));

    let mut updated = Vec::with_capacity(children.len() + 2);
    updated.push(Node::element(span));
    updated.push(Node::text(" "));
    updated.extend(children);
    caption_el.set_children(updated);
}

/// Whether a node is a label injected by this pass.
fn is_label(node: &NodeRef) -> bool {
    node.as_element()
        .is_some_and(|el| el.attr(LABEL_MARKER).is_some())
}

/// Finalize display text for nodes implementing the capability.
fn finalize_element(el: &Element) {
    if let TagSpec::Ref(reference) = el.spec()
        && let Some(label) = reference.label()
    {
        el.set_children(vec![Node::text(label)]);
    }
}

fn capitalize(style: &str) -> String {
    let mut chars = style.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;

    use folio_cmd::CommandRunner;
    use folio_storage::MockStorage;

    use super::*;
    use crate::pipeline::Scheduler;
    use crate::tree::FigureTag;

    /// Deterministic generator for stable assertions.
    struct SeqIds(AtomicU32);

    impl IdGenerator for SeqIds {
        fn generate(&self) -> String {
            format!("gen-{}", self.0.fetch_add(1, Ordering::Relaxed) + 1)
        }
    }

    fn seq_processor() -> RefProcessor {
        RefProcessor::with_id_generator(Box::new(SeqIds(AtomicU32::new(0))))
    }

    fn doc_with(children: Vec<NodeRef>) -> Document {
        let root = Element::with_spec(Atom::new("document"), TagSpec::Document);
        root.set_children(children);
        Document::new(
            Node::element(root),
            "index.md".to_owned(),
            ".".to_owned(),
            PathBuf::from("."),
            Arc::new(MockStorage::new()),
            Arc::new(CommandRunner::without_cache()),
            Scheduler::Sequential,
        )
    }

    fn figure(id: &str, style: &str, caption: &str) -> NodeRef {
        let el = Element::with_spec(Atom::new("figure"), TagSpec::Figure(FigureTag::new(style)));
        el.set_attr("id", id);
        let cap = Element::with_spec(Atom::new("figcaption"), TagSpec::Figcaption);
        cap.push_child(Node::text(caption));
        el.push_child(Node::element(cap));
        Node::element(el)
    }

    fn heading(level: u8, text: &str) -> NodeRef {
        let el = Element::with_spec(Atom::new(format!("h{level}").as_str()), TagSpec::Heading(level));
        el.push_child(Node::text(text));
        Node::element(el)
    }

    fn figure_numbers(node: &NodeRef) -> (u32, u32) {
        let el = node.as_element().unwrap();
        let TagSpec::Figure(fig) = el.spec() else {
            panic!("not a figure");
        };
        fig.numbers().expect("figure numbered")
    }

    #[test]
    fn test_positions_increase_in_document_order() {
        let figures: Vec<NodeRef> = (1..=4)
            .map(|i| figure(&format!("f{i}"), "figure", &format!("caption {i}")))
            .collect();
        let doc = doc_with(figures.clone());

        seq_processor().process(&doc).unwrap();

        for (i, node) in figures.iter().enumerate() {
            let (section, pos) = figure_numbers(node);
            assert_eq!(section, 1);
            assert_eq!(pos, u32::try_from(i).unwrap() + 1);
        }
    }

    #[test]
    fn test_counters_scoped_by_style() {
        let fig = figure("f1", "figure", "a figure");
        let listing = figure("l1", "listing", "a listing");
        let doc = doc_with(vec![fig.clone(), listing.clone()]);

        seq_processor().process(&doc).unwrap();

        assert_eq!(figure_numbers(&fig), (1, 1));
        assert_eq!(figure_numbers(&listing), (1, 1));
    }

    #[test]
    fn test_counters_scoped_by_section() {
        let first = figure("f1", "figure", "first");
        let second = figure("f2", "figure", "second");
        let doc = doc_with(vec![
            heading(1, "One"),
            first.clone(),
            heading(1, "Two"),
            second.clone(),
        ]);

        seq_processor().process(&doc).unwrap();

        assert_eq!(figure_numbers(&first), (1, 1));
        assert_eq!(figure_numbers(&second), (2, 1));
    }

    #[test]
    fn test_label_injected_into_caption() {
        let fig = figure("f1", "listing", "sort in place");
        let doc = doc_with(vec![fig.clone()]);

        seq_processor().process(&doc).unwrap();

        let html = fig.to_html();
        assert!(html.contains("Listing 1.1:"), "html: {html}");
        assert!(html.contains("sort in place"));
    }

    #[test]
    fn test_processing_twice_is_idempotent() {
        let fig = figure("f1", "figure", "stable");
        let reference = {
            let el = Element::with_spec(Atom::new("ref"), TagSpec::Ref(Default::default()));
            el.set_attr("id", "f1");
            Node::element(el)
        };
        let doc = doc_with(vec![fig, reference]);

        seq_processor().process(&doc).unwrap();
        let first = doc.to_html();

        // Fresh processor, same tree: identical output, no duplicate labels
        seq_processor().process(&doc).unwrap();
        let second = doc.to_html();

        assert_eq!(first, second);
        assert_eq!(first.matches(LABEL_MARKER).count(), 1);
    }

    #[test]
    fn test_reference_rewired_to_new_id() {
        let fig = figure("original", "figure", "target");
        let reference = {
            let el = Element::with_spec(Atom::new("ref"), TagSpec::Ref(Default::default()));
            el.set_attr("id", "original");
            Node::element(el)
        };
        let doc = doc_with(vec![fig.clone(), reference.clone()]);

        seq_processor().process(&doc).unwrap();

        let fig_el = fig.as_element().unwrap();
        let ref_el = reference.as_element().unwrap();
        assert_eq!(fig_el.attr("id"), Some("gen-1".to_owned()));
        assert_eq!(ref_el.attr("id"), Some("gen-1".to_owned()));

        // The reference holds a live pointer and renders a resolved link
        let TagSpec::Ref(ref_tag) = ref_el.spec() else {
            panic!("not a ref");
        };
        assert!(ref_tag.target().unwrap().upgrade().is_some());
        assert_eq!(
            reference.to_html(),
            r##"<a href="#gen-1">Figure 1.1</a>"##
        );
    }

    #[test]
    fn test_unmatched_reference_left_alone() {
        let fig = figure("f1", "figure", "target");
        let reference = {
            let el = Element::with_spec(Atom::new("ref"), TagSpec::Ref(Default::default()));
            el.set_attr("id", "something-else");
            Node::element(el)
        };
        let doc = doc_with(vec![fig, reference.clone()]);

        seq_processor().process(&doc).unwrap();

        let ref_el = reference.as_element().unwrap();
        assert_eq!(ref_el.attr("id"), Some("something-else".to_owned()));
        let TagSpec::Ref(ref_tag) = ref_el.spec() else {
            panic!("not a ref");
        };
        assert!(ref_tag.label().is_none());
    }

    #[test]
    fn test_missing_caption_aborts() {
        let bare = Element::with_spec(Atom::new("figure"), TagSpec::Figure(FigureTag::new("figure")));
        bare.set_attr("id", "f1");
        let doc = doc_with(vec![Node::element(bare)]);

        let err = seq_processor().process(&doc).unwrap_err();

        assert!(matches!(err, RefError::MissingCaption { .. }));
        assert_eq!(err.to_json()["type"], "missing-caption");
    }

    #[test]
    fn test_empty_caption_aborts() {
        let fig = figure("f1", "figure", "   ");
        let doc = doc_with(vec![fig]);

        let err = seq_processor().process(&doc).unwrap_err();

        assert!(matches!(err, RefError::EmptyCaption { .. }));
    }

    #[test]
    fn test_multiple_captions_abort() {
        let el = Element::with_spec(Atom::new("figure"), TagSpec::Figure(FigureTag::new("figure")));
        el.set_attr("id", "f1");
        for text in ["one", "two"] {
            let cap = Element::with_spec(Atom::new("figcaption"), TagSpec::Figcaption);
            cap.push_child(Node::text(text));
            el.push_child(Node::element(cap));
        }
        let doc = doc_with(vec![Node::element(el)]);

        let err = seq_processor().process(&doc).unwrap_err();

        assert!(matches!(err, RefError::MultipleCaptions { count: 2, .. }));
    }

    #[test]
    fn test_next_and_cur_index() {
        let processor = seq_processor();

        assert_eq!(processor.cur_index("figure"), 0);
        assert_eq!(processor.next_index("figure"), 1);
        assert_eq!(processor.next_index("figure"), 2);
        assert_eq!(processor.cur_index("figure"), 2);
        // Styles do not share counters
        assert_eq!(processor.cur_index("table"), 0);
    }
}
