//! Constructor dispatch: raw nodes into typed tree nodes.
//!
//! Once an element's children are resolved, the element goes through the
//! parser's atom→constructor lookup. Registered custom constructors win;
//! otherwise the built-in set below applies, and unknown atoms become
//! generic elements. Constructors are pure and synchronous apart from
//! file-existence checks and eager snippet extraction.

use std::collections::BTreeMap;

use folio_snippets::{Range, SnippetSource};

use crate::error::{ParseError, TagError};
use crate::parser::BuildContext;
use crate::parser::builder::RawNode;
use crate::tree::{
    Atom, CellKind, CmdTag, CodeKind, CodeTag, Element, FigureTag, Node, NodeRef, PageTag, RefTag,
    TagSpec, VarTag,
};

/// Parts of an element handed to a tag constructor.
pub struct TagParts {
    /// The element's atom.
    pub atom: Atom,
    /// Raw attributes from the markup.
    pub attrs: BTreeMap<String, String>,
    /// Already-resolved children.
    pub children: Vec<NodeRef>,
}

impl TagParts {
    /// Assemble an element from these parts with the given variant.
    #[must_use]
    pub fn into_element(self, spec: TagSpec) -> NodeRef {
        let el = Element::with_spec(self.atom, spec);
        el.set_attrs(self.attrs);
        el.set_children(self.children);
        Node::element(el)
    }

    /// A required, non-empty attribute.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::Attr`] when absent or empty.
    pub fn require_attr(&self, name: &str) -> Result<String, TagError> {
        match self.attrs.get(name) {
            None => Err(crate::tree::AttrError::NotFound {
                name: name.to_owned(),
            }
            .into()),
            Some(value) if value.is_empty() => Err(crate::tree::AttrError::Empty {
                name: name.to_owned(),
            }
            .into()),
            Some(value) => Ok(value.clone()),
        }
    }
}

/// Resolve a raw node bottom-up into a typed node.
pub(crate) fn resolve(ctx: &BuildContext<'_>, raw: RawNode) -> Result<NodeRef, ParseError> {
    match raw {
        RawNode::Text(text) => Ok(Node::text(text)),
        RawNode::Element(el) => {
            let children = el
                .children
                .into_iter()
                .map(|child| resolve(ctx, child))
                .collect::<Result<Vec<_>, _>>()?;

            let atom = Atom::new(&el.tag);
            let parts = TagParts {
                atom: atom.clone(),
                attrs: el.attrs,
                children,
            };

            let constructed = match ctx.constructor(atom.as_str()) {
                Some(custom) => custom(ctx, parts),
                None => build_builtin(ctx, parts),
            };
            constructed.map_err(|source| ParseError::Constructor {
                atom: atom.to_string(),
                source,
            })
        }
    }
}

/// The built-in atom→constructor table.
fn build_builtin(ctx: &BuildContext<'_>, parts: TagParts) -> Result<NodeRef, TagError> {
    match parts.atom.as_str() {
        "code" => build_code(ctx, parts),
        "figure" => build_figure(ctx, parts),
        "figcaption" => Ok(parts.into_element(TagSpec::Figcaption)),
        "ref" => build_ref(parts),
        "cmd" => build_cmd(parts),
        "var" => build_var(parts),
        "page" => Ok(parts.into_element(TagSpec::Page(PageTag::default()))),
        "include" => build_include(ctx, parts),
        "title" => Ok(parts.into_element(TagSpec::Title)),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = parts.atom.as_str().as_bytes()[1] - b'0';
            Ok(parts.into_element(TagSpec::Heading(level)))
        }
        "th" => Ok(parts.into_element(TagSpec::Cell(CellKind::Header))),
        "td" => Ok(parts.into_element(TagSpec::Cell(CellKind::Data))),
        _ => Ok(parts.into_element(TagSpec::Generic)),
    }
}

/// Language hint from a `lang` attribute or a `language-*` class.
fn code_lang(attrs: &BTreeMap<String, String>) -> Option<String> {
    if let Some(lang) = attrs.get("lang") {
        return Some(lang.clone());
    }
    attrs.get("class").and_then(|classes| {
        classes
            .split_whitespace()
            .find_map(|class| class.strip_prefix("language-"))
            .map(str::to_owned)
    })
}

/// Extract the excerpt a source-backed code tag asks for.
fn extract_excerpt(
    ctx: &BuildContext<'_>,
    file: &str,
    snippet: Option<&str>,
    range: Option<&str>,
) -> Result<String, TagError> {
    if !ctx.storage().exists(file) {
        return Err(TagError::MissingSource {
            path: file.to_owned(),
        });
    }
    let content = ctx.storage().read(file)?;
    let extension = file.rsplit_once('.').map_or("", |(_, ext)| ext);
    // Named snippets are extracted eagerly on first read; a duplicate
    // name in the file surfaces here even for pure range requests
    let source = SnippetSource::parse(&content, extension, ctx.conventions())?;

    if let Some(name) = snippet {
        return Ok(source.named(name)?.to_owned());
    }
    if let Some(spec) = range {
        return Ok(source.lines(Range::parse(spec)?));
    }
    Ok(source.text())
}

fn build_code(ctx: &BuildContext<'_>, parts: TagParts) -> Result<NodeRef, TagError> {
    let lang = code_lang(&parts.attrs);

    let Some(src) = parts.attrs.get("src").cloned() else {
        // No source file: literal inline or fenced content
        let literal = parts
            .children
            .iter()
            .map(|child| child.text_content())
            .collect::<String>();
        let kind = if lang.is_some() || literal.contains('\n') {
            CodeKind::Fenced
        } else {
            CodeKind::Inline
        };
        return Ok(parts.into_element(TagSpec::Code(CodeTag {
            kind,
            lang,
            sources: Vec::new(),
        })));
    };

    if src.is_empty() {
        return Err(crate::tree::AttrError::Empty {
            name: "src".to_owned(),
        }
        .into());
    }

    let snippet = parts.attrs.get("snippet").map(String::as_str);
    let range = parts.attrs.get("range").map(String::as_str);
    let sources: Vec<String> = src.split(',').map(|s| s.trim().to_owned()).collect();

    let mut excerpts = Vec::with_capacity(sources.len());
    for file in &sources {
        excerpts.push(extract_excerpt(ctx, file, snippet, range)?);
    }

    let kind = if sources.len() > 1 {
        CodeKind::MultiSource
    } else {
        CodeKind::Source
    };
    let lang = lang.or_else(|| {
        sources[0]
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_owned())
    });

    let mut parts = parts;
    parts.children = vec![Node::text(excerpts.join("\n"))];
    Ok(parts.into_element(TagSpec::Code(CodeTag {
        kind,
        lang,
        sources,
    })))
}

fn build_figure(ctx: &BuildContext<'_>, parts: TagParts) -> Result<NodeRef, TagError> {
    let style = parts
        .attrs
        .get("type")
        .cloned()
        .unwrap_or_else(|| "figure".to_owned());

    let mut parts = parts;
    if let Some(src) = parts.attrs.get("src").cloned()
        && !src.is_empty()
    {
        // A source-backed figure body sub-parses in its own directory
        let mut body = ctx.subparse(&src)?;
        body.append(&mut parts.children);
        parts.children = body;
    }

    Ok(parts.into_element(TagSpec::Figure(FigureTag::new(style))))
}

fn build_ref(parts: TagParts) -> Result<NodeRef, TagError> {
    parts.require_attr("id")?;
    Ok(parts.into_element(TagSpec::Ref(RefTag::default())))
}

fn build_cmd(parts: TagParts) -> Result<NodeRef, TagError> {
    let command = parts
        .children
        .iter()
        .map(|child| child.text_content())
        .collect::<String>()
        .trim()
        .to_owned();
    if command.is_empty() {
        return Err(TagError::Invalid("cmd requires a command".to_owned()));
    }

    let expected_exit = match parts.attrs.get("exit") {
        None => 0,
        Some(raw) => raw
            .parse()
            .map_err(|_| TagError::Invalid(format!("invalid exit code {raw:?}")))?,
    };

    let spec = TagSpec::Cmd(CmdTag {
        command,
        dir: parts.attrs.get("dir").filter(|d| !d.is_empty()).cloned(),
        expected_exit,
        cache: parts.attrs.get("cache").is_some_and(|v| v == "true"),
        into_var: parts.attrs.get("into").filter(|v| !v.is_empty()).cloned(),
    });
    Ok(parts.into_element(spec))
}

fn build_var(parts: TagParts) -> Result<NodeRef, TagError> {
    let name = parts.require_attr("name")?;

    let value = parts.attrs.get("value").cloned().or_else(|| {
        let text = parts
            .children
            .iter()
            .map(|child| child.text_content())
            .collect::<String>();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    });

    Ok(parts.into_element(TagSpec::Var(VarTag::new(name, value))))
}

fn build_include(ctx: &BuildContext<'_>, parts: TagParts) -> Result<NodeRef, TagError> {
    let src = parts.require_attr("src")?;
    let body = ctx.subparse(&src)?;

    let mut parts = parts;
    parts.children = body;
    Ok(parts.into_element(TagSpec::Include))
}
