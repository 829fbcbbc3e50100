//! Raw tree building from HTML via the external tokenizer.
//!
//! The converted document is wrapped in a synthetic root element and fed
//! through quick-xml's event reader; the events fold into an untyped
//! [`RawNode`] tree that constructor dispatch then turns into the typed
//! document tree. Full HTML5 conformance is out of scope: input is the
//! XHTML-shaped output of the Markdown converter plus the author's
//! directive tags.

use std::collections::BTreeMap;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ParseError;

/// Synthetic root wrapped around the document fragment.
const ROOT_TAG: &str = "folio-root";

/// An untyped element fresh out of the tokenizer.
#[derive(Debug, Default)]
pub(crate) struct RawElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<RawNode>,
}

/// An untyped node fresh out of the tokenizer.
#[derive(Debug)]
pub(crate) enum RawNode {
    Text(String),
    Element(RawElement),
}

/// Parse an HTML fragment into raw nodes.
pub(crate) fn build_tree(html: &str) -> Result<Vec<RawNode>, ParseError> {
    let wrapped = format!("<{ROOT_TAG}>{html}</{ROOT_TAG}>");
    let mut reader = Reader::from_str(&wrapped);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    // Consume the synthetic root's start tag
    let mut buf = Vec::new();
    match reader
        .read_event_into(&mut buf)
        .map_err(|e| ParseError::Malformed(e.to_string()))?
    {
        Event::Start(_) => {}
        other => {
            return Err(ParseError::Malformed(format!(
                "unexpected leading event: {other:?}"
            )));
        }
    }
    buf.clear();

    parse_children(&mut reader, ROOT_TAG)
}

/// Parse children until the parent's end tag (or end of input).
fn parse_children<R: BufRead>(
    reader: &mut Reader<R>,
    parent: &str,
) -> Result<Vec<RawNode>, ParseError> {
    let mut buf = Vec::new();
    let mut nodes = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::Malformed(e.to_string()))?
        {
            Event::Start(e) => {
                let tag = decode_name(reader, e.name().as_ref());
                let attrs = decode_attrs(reader, &e);
                let children = parse_children(reader, &tag)?;
                nodes.push(RawNode::Element(RawElement {
                    tag,
                    attrs,
                    children,
                }));
            }
            Event::Empty(e) => {
                nodes.push(RawNode::Element(RawElement {
                    tag: decode_name(reader, e.name().as_ref()),
                    attrs: decode_attrs(reader, &e),
                    children: Vec::new(),
                }));
            }
            Event::Text(e) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| ParseError::Malformed(err.to_string()))?
                    .into_owned();
                append_text(&mut nodes, &text);
            }
            Event::GeneralRef(e) => {
                let entity = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| ParseError::Malformed(err.to_string()))?
                    .into_owned();
                append_text(&mut nodes, &decode_entity(&entity));
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append_text(&mut nodes, &text);
            }
            Event::End(e) => {
                let end_tag = decode_name(reader, e.name().as_ref());
                if end_tag == parent {
                    return Ok(nodes);
                }
                // Stray end tag; skip it
            }
            Event::Eof => return Ok(nodes),
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }
}

/// Merge adjacent text into one node to keep the tree compact.
fn append_text(nodes: &mut Vec<RawNode>, text: &str) {
    if let Some(RawNode::Text(existing)) = nodes.last_mut() {
        existing.push_str(text);
    } else {
        nodes.push(RawNode::Text(text.to_owned()));
    }
}

fn decode_name<R: BufRead>(reader: &Reader<R>, name: &[u8]) -> String {
    reader.decoder().decode(name).map_or_else(
        |_| String::from_utf8_lossy(name).into_owned(),
        std::borrow::Cow::into_owned,
    )
}

fn decode_attrs<R: BufRead>(reader: &Reader<R>, e: &BytesStart) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for attr in e.attributes().flatten() {
        let key = reader.decoder().decode(attr.key.as_ref()).map_or_else(
            |_| String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            std::borrow::Cow::into_owned,
        );
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            std::borrow::Cow::into_owned,
        );
        attrs.insert(key, value);
    }
    attrs
}

/// Decode an entity reference to its character value.
fn decode_entity(entity: &str) -> String {
    match entity {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "apos" => "'".to_owned(),
        "quot" => "\"".to_owned(),
        "nbsp" => "\u{00a0}".to_owned(),
        s if s.starts_with('#') => {
            let code = if s.starts_with("#x") || s.starts_with("#X") {
                u32::from_str_radix(&s[2..], 16).ok()
            } else {
                s[1..].parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map_or_else(|| format!("&{entity};"), |c| c.to_string())
        }
        // Unknown entity: preserve as written
        _ => format!("&{entity};"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_element(nodes: &[RawNode]) -> &RawElement {
        let elements: Vec<&RawElement> = nodes
            .iter()
            .filter_map(|n| match n {
                RawNode::Element(el) => Some(el),
                RawNode::Text(_) => None,
            })
            .collect();
        assert_eq!(elements.len(), 1, "expected one element in {nodes:?}");
        elements[0]
    }

    #[test]
    fn test_simple_element() {
        let nodes = build_tree("<p>Hello</p>").unwrap();

        let p = only_element(&nodes);
        assert_eq!(p.tag, "p");
        assert!(matches!(&p.children[0], RawNode::Text(t) if t == "Hello"));
    }

    #[test]
    fn test_nested_elements() {
        let nodes = build_tree("<p><strong>Bold</strong> text</p>").unwrap();

        let p = only_element(&nodes);
        assert_eq!(p.children.len(), 2);
        let RawNode::Element(strong) = &p.children[0] else {
            panic!("expected element");
        };
        assert_eq!(strong.tag, "strong");
        assert!(matches!(&p.children[1], RawNode::Text(t) if t == " text"));
    }

    #[test]
    fn test_attributes() {
        let nodes = build_tree(r#"<code src="main.rs" snippet="demo"></code>"#).unwrap();

        let code = only_element(&nodes);
        assert_eq!(code.attrs["src"], "main.rs");
        assert_eq!(code.attrs["snippet"], "demo");
    }

    #[test]
    fn test_self_closing_element() {
        let nodes = build_tree(r#"<p>a<br/>b</p>"#).unwrap();

        let p = only_element(&nodes);
        assert_eq!(p.children.len(), 3);
        let RawNode::Element(br) = &p.children[1] else {
            panic!("expected element");
        };
        assert_eq!(br.tag, "br");
    }

    #[test]
    fn test_entities_decode() {
        let nodes = build_tree("<p>a &lt; b &amp; c</p>").unwrap();

        let p = only_element(&nodes);
        assert!(matches!(&p.children[0], RawNode::Text(t) if t == "a < b & c"));
    }

    #[test]
    fn test_numeric_entity() {
        let nodes = build_tree("<p>&#65;&#x42;</p>").unwrap();

        let p = only_element(&nodes);
        assert!(matches!(&p.children[0], RawNode::Text(t) if t == "AB"));
    }

    #[test]
    fn test_comments_skipped() {
        let nodes = build_tree("<p><!-- hidden -->visible</p>").unwrap();

        let p = only_element(&nodes);
        assert_eq!(p.children.len(), 1);
        assert!(matches!(&p.children[0], RawNode::Text(t) if t == "visible"));
    }

    #[test]
    fn test_top_level_siblings() {
        let nodes = build_tree("<h1>One</h1>\n<p>Two</p>").unwrap();

        let tags: Vec<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                RawNode::Element(el) => Some(el.tag.as_str()),
                RawNode::Text(_) => None,
            })
            .collect();
        assert_eq!(tags, vec!["h1", "p"]);
    }

    #[test]
    fn test_malformed_markup_errors() {
        // An attribute with an unterminated quote cannot tokenize
        assert!(build_tree(r#"<p class="x>text</p>"#).is_err());
    }
}
