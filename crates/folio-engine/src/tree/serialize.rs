//! HTML and Markdown serialization of document trees.
//!
//! Both serializers are full renditions of the tree: directive tags that
//! have no native Markdown form (figures, commands, unresolved
//! references) fall back to their HTML serialization inside the Markdown
//! output, which keeps both forms round-trippable through the parser.

use std::fmt::Write;

use crate::tree::{CellKind, CodeKind, Element, Node, TagSpec};

/// Atoms that render as self-closing void elements.
const VOID_ATOMS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Escape text content for HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escape an attribute value for HTML.
fn escape_attr(value: &str) -> String {
    escape_html(value).replace('"', "&quot;")
}

pub(crate) fn to_html(node: &Node) -> String {
    match node {
        Node::Text(text) => escape_html(text),
        Node::Element(el) => element_html(el),
    }
}

fn element_html(el: &Element) -> String {
    match el.spec() {
        // Includes are transparent containers: they serialize as their
        // resolved content
        TagSpec::Include => children_html(el),
        // A resolved reference renders as a link to its figure
        TagSpec::Ref(r) => {
            if let (Some(label), Some(id)) = (r.label(), el.attr("id")) {
                format!(r##"<a href="#{}">{}</a>"##, escape_attr(&id), escape_html(&label))
            } else {
                generic_html(el)
            }
        }
        // A resolved variable reference renders as its value
        TagSpec::Var(var) if !var.is_definition => {
            var.value().map_or_else(|| generic_html(el), |v| escape_html(&v))
        }
        _ => generic_html(el),
    }
}

fn generic_html(el: &Element) -> String {
    let mut out = String::new();
    let _ = write!(out, "<{}", el.atom());
    for (name, value) in el.attrs() {
        let _ = write!(out, " {name}=\"{}\"", escape_attr(&value));
    }

    let children = children_html(el);
    if children.is_empty() && VOID_ATOMS.contains(&el.atom().as_str()) {
        out.push_str("/>");
    } else {
        let _ = write!(out, ">{children}</{}>", el.atom());
    }
    out
}

fn children_html(el: &Element) -> String {
    el.children().iter().map(|child| to_html(child)).collect()
}

pub(crate) fn to_markdown(node: &Node) -> String {
    match node {
        Node::Text(text) => text.clone(),
        Node::Element(el) => element_markdown(el),
    }
}

fn element_markdown(el: &Element) -> String {
    match el.spec() {
        TagSpec::Heading(level) => {
            let hashes = "#".repeat(usize::from(*level));
            format!("{hashes} {}\n\n", el.text_content().trim())
        }
        TagSpec::Code(code) => code_markdown(el, code.kind, code.lang.as_deref()),
        TagSpec::Include | TagSpec::Page(_) | TagSpec::Document => children_markdown(el),
        TagSpec::Ref(r) => {
            if let (Some(label), Some(id)) = (r.label(), el.attr("id")) {
                format!("[{label}](#{id})")
            } else {
                element_html(el)
            }
        }
        TagSpec::Var(var) if !var.is_definition => var
            .value()
            .unwrap_or_else(|| element_html(el)),
        // Directive and figure tags have no Markdown form
        TagSpec::Figure(_) | TagSpec::Cmd(_) | TagSpec::CmdResult | TagSpec::Var(_) => {
            format!("{}\n\n", element_html(el))
        }
        TagSpec::Title => format!("<title>{}</title>\n\n", escape_html(&el.text_content())),
        TagSpec::Figcaption | TagSpec::Cell(_) => children_markdown(el),
        TagSpec::Generic => generic_markdown(el),
    }
}

fn code_markdown(el: &Element, kind: CodeKind, lang: Option<&str>) -> String {
    let text = el.text_content();
    match kind {
        CodeKind::Inline => format!("`{text}`"),
        CodeKind::Fenced | CodeKind::Source | CodeKind::MultiSource => {
            format!("```{}\n{}\n```\n\n", lang.unwrap_or(""), text.trim_end())
        }
    }
}

fn generic_markdown(el: &Element) -> String {
    match el.atom().as_str() {
        "p" => format!("{}\n\n", children_markdown(el).trim_end()),
        "em" | "i" => format!("*{}*", children_markdown(el)),
        "strong" | "b" => format!("**{}**", children_markdown(el)),
        "a" => format!(
            "[{}]({})",
            children_markdown(el),
            el.attr("href").unwrap_or_default()
        ),
        "img" => format!(
            "![{}]({})",
            el.attr("alt").unwrap_or_default(),
            el.attr("src").unwrap_or_default()
        ),
        "br" => "  \n".to_owned(),
        // Page boundaries own "---"; thematic breaks use the alternate form
        "hr" => "***\n\n".to_owned(),
        "ul" => list_markdown(el, None),
        "ol" => list_markdown(el, Some(1)),
        "blockquote" => {
            let inner = children_markdown(el);
            let mut out = String::new();
            for line in inner.trim_end().lines() {
                let _ = writeln!(out, "> {line}");
            }
            out.push('\n');
            out
        }
        "pre" => {
            // A pre wrapping a single code child collapses into the fence
            let children = el.children();
            if let [only] = children.as_slice()
                && let Some(inner) = only.as_element()
                && let TagSpec::Code(code) = inner.spec()
            {
                return code_markdown(inner, CodeKind::Fenced, code.lang.as_deref());
            }
            format!("```\n{}\n```\n\n", el.text_content().trim_end())
        }
        "table" => table_markdown(el),
        "thead" | "tbody" | "tr" => children_markdown(el),
        // Unknown atoms keep their HTML form
        _ => element_html(el),
    }
}

fn list_markdown(el: &Element, ordered_from: Option<usize>) -> String {
    let mut out = String::new();
    let mut index = ordered_from.unwrap_or(0);
    for child in el.children() {
        let Some(item) = child.as_element() else {
            continue;
        };
        if *item.atom() != "li" {
            continue;
        }
        let body = children_markdown(item);
        let body = body.trim_end();
        if ordered_from.is_some() {
            let _ = writeln!(out, "{index}. {body}");
            index += 1;
        } else {
            let _ = writeln!(out, "- {body}");
        }
    }
    out.push('\n');
    out
}

fn table_markdown(el: &Element) -> String {
    let mut rows: Vec<(bool, Vec<String>)> = Vec::new();
    collect_rows(el, &mut rows);

    let mut out = String::new();
    for (i, (is_header, cells)) in rows.iter().enumerate() {
        let _ = writeln!(out, "| {} |", cells.join(" | "));
        if i == 0 && *is_header {
            let separators = vec!["---"; cells.len()];
            let _ = writeln!(out, "| {} |", separators.join(" | "));
        }
    }
    out.push('\n');
    out
}

fn collect_rows(el: &Element, rows: &mut Vec<(bool, Vec<String>)>) {
    for child in el.children() {
        let Some(inner) = child.as_element() else {
            continue;
        };
        match inner.atom().as_str() {
            "thead" | "tbody" => collect_rows(inner, rows),
            "tr" => {
                let mut cells = Vec::new();
                let mut is_header = false;
                for cell in inner.children() {
                    let Some(cell_el) = cell.as_element() else {
                        continue;
                    };
                    if let TagSpec::Cell(kind) = cell_el.spec() {
                        is_header |= *kind == CellKind::Header;
                        cells.push(children_markdown(cell_el).trim().to_owned());
                    }
                }
                rows.push((is_header, cells));
            }
            _ => {}
        }
    }
}

fn children_markdown(el: &Element) -> String {
    el.children()
        .iter()
        .map(|child| to_markdown(child))
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tree::{Atom, CodeTag, FigureTag, RefTag, VarTag};

    fn el(atom: &str) -> Element {
        Element::new(Atom::new(atom))
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn test_text_html_is_escaped() {
        assert_eq!(Node::text("1 < 2").to_html(), "1 &lt; 2");
    }

    #[test]
    fn test_element_html_with_attrs() {
        let p = el("p");
        p.set_attr("class", "note");
        p.push_child(Node::text("hi"));

        assert_eq!(Node::element(p).to_html(), r#"<p class="note">hi</p>"#);
    }

    #[test]
    fn test_attrs_serialize_sorted() {
        let p = el("p");
        p.set_attr("z", "1");
        p.set_attr("a", "2");

        assert_eq!(Node::element(p).to_html(), r#"<p a="2" z="1"></p>"#);
    }

    #[test]
    fn test_void_element() {
        let br = el("br");
        assert_eq!(Node::element(br).to_html(), "<br/>");
    }

    #[test]
    fn test_attr_value_escaped() {
        let a = el("a");
        a.set_attr("href", "x?a=1&b=\"2\"");

        assert_eq!(
            Node::element(a).to_html(),
            r#"<a href="x?a=1&amp;b=&quot;2&quot;"></a>"#
        );
    }

    #[test]
    fn test_resolved_ref_html() {
        let r = Element::with_spec(Atom::new("ref"), TagSpec::Ref(RefTag::default()));
        r.set_attr("id", "fig-new");
        if let TagSpec::Ref(tag) = r.spec() {
            tag.resolve(std::sync::Weak::new(), "Figure 1.2".to_owned());
        }

        assert_eq!(
            Node::element(r).to_html(),
            r##"<a href="#fig-new">Figure 1.2</a>"##
        );
    }

    #[test]
    fn test_unresolved_ref_html() {
        let r = Element::with_spec(Atom::new("ref"), TagSpec::Ref(RefTag::default()));
        r.set_attr("id", "fig-x");

        assert_eq!(Node::element(r).to_html(), r#"<ref id="fig-x"></ref>"#);
    }

    #[test]
    fn test_resolved_var_reference_html() {
        let v = Element::with_spec(Atom::new("var"), TagSpec::Var(VarTag::new("version", None)));
        if let TagSpec::Var(tag) = v.spec() {
            tag.resolve("1.2".to_owned());
        }

        assert_eq!(Node::element(v).to_html(), "1.2");
    }

    #[test]
    fn test_heading_markdown() {
        let h = Element::with_spec(Atom::new("h2"), TagSpec::Heading(2));
        h.push_child(Node::text("Setup"));

        assert_eq!(Node::element(h).to_markdown(), "## Setup\n\n");
    }

    #[test]
    fn test_paragraph_markdown() {
        let p = el("p");
        p.push_child(Node::text("plain "));
        let em = el("em");
        em.push_child(Node::text("loud"));
        p.push_child(Node::element(em));

        assert_eq!(Node::element(p).to_markdown(), "plain *loud*\n\n");
    }

    #[test]
    fn test_inline_code_markdown() {
        let c = Element::with_spec(
            Atom::new("code"),
            TagSpec::Code(CodeTag {
                kind: CodeKind::Inline,
                lang: None,
                sources: Vec::new(),
            }),
        );
        c.push_child(Node::text("x + y"));

        assert_eq!(Node::element(c).to_markdown(), "`x + y`");
    }

    #[test]
    fn test_fenced_code_markdown() {
        let c = Element::with_spec(
            Atom::new("code"),
            TagSpec::Code(CodeTag {
                kind: CodeKind::Source,
                lang: Some("rust".to_owned()),
                sources: vec!["main.rs".to_owned()],
            }),
        );
        c.push_child(Node::text("fn main() {}\n"));

        assert_eq!(
            Node::element(c).to_markdown(),
            "```rust\nfn main() {}\n```\n\n"
        );
    }

    #[test]
    fn test_list_markdown() {
        let ul = el("ul");
        for text in ["one", "two"] {
            let li = el("li");
            li.push_child(Node::text(text));
            ul.push_child(Node::element(li));
        }

        assert_eq!(Node::element(ul).to_markdown(), "- one\n- two\n\n");
    }

    #[test]
    fn test_table_markdown() {
        let table = el("table");
        let header = el("tr");
        for text in ["Name", "Value"] {
            let th = Element::with_spec(Atom::new("th"), TagSpec::Cell(CellKind::Header));
            th.push_child(Node::text(text));
            header.push_child(Node::element(th));
        }
        let row = el("tr");
        for text in ["x", "1"] {
            let td = Element::with_spec(Atom::new("td"), TagSpec::Cell(CellKind::Data));
            td.push_child(Node::text(text));
            row.push_child(Node::element(td));
        }
        table.push_child(Node::element(header));
        table.push_child(Node::element(row));

        assert_eq!(
            Node::element(table).to_markdown(),
            "| Name | Value |\n| --- | --- |\n| x | 1 |\n\n"
        );
    }

    #[test]
    fn test_figure_markdown_falls_back_to_html() {
        let fig = Element::with_spec(Atom::new("figure"), TagSpec::Figure(FigureTag::new("figure")));
        fig.set_attr("id", "f1");

        assert_eq!(Node::element(fig).to_markdown(), "<figure id=\"f1\"></figure>\n\n");
    }

    #[test]
    fn test_include_is_transparent() {
        let include = Element::with_spec(Atom::new("include"), TagSpec::Include);
        include.set_attr("src", "part.md");
        let p = el("p");
        p.push_child(Node::text("included"));
        include.push_child(Node::element(p));

        let include = Node::element(include);
        assert_eq!(include.to_html(), "<p>included</p>");
        assert_eq!(include.to_markdown(), "included\n\n");
    }
}
