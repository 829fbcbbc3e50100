//! Byte-level transforms applied before parsing.
//!
//! The PreParse stage is an ordered chain of text transforms. The default
//! chain substitutes parser-level variables, then converts Markdown input
//! to HTML chunk-wise, wrapping `---`-delimited chunks into `<page>`
//! boundaries. Hosts can insert their own transforms between the two.

use pulldown_cmark::{Options, html};

use crate::error::TransformError;

/// A byte-level transform in the PreParse chain.
///
/// Transforms receive the document's filename so they can decide whether
/// they apply (the Markdown converter passes non-`.md` input through
/// untouched).
pub trait PreParse: Send + Sync {
    /// Name identifying this transform in PreParse errors.
    fn name(&self) -> &str;

    /// Transform the input, or fail the whole PreParse stage.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`]; the pipeline wraps it with this
    /// transform's name.
    fn apply(&self, filename: &str, input: String) -> Result<String, TransformError>;
}

/// Replaces `{{ name }}` tokens with parser-level variable values.
///
/// Unknown names are left verbatim so later stages (document variables,
/// command captures) can still handle them.
pub(crate) struct VarSubstitution {
    vars: std::collections::BTreeMap<String, String>,
}

impl VarSubstitution {
    pub(crate) fn new(vars: std::collections::BTreeMap<String, String>) -> Self {
        Self { vars }
    }
}

impl PreParse for VarSubstitution {
    fn name(&self) -> &str {
        "variables"
    }

    fn apply(&self, _filename: &str, input: String) -> Result<String, TransformError> {
        if self.vars.is_empty() || !input.contains("{{") {
            return Ok(input);
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                // Unterminated token: keep the rest verbatim
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let name = after[..end].trim();
            if let Some(value) = self.vars.get(name) {
                out.push_str(value);
            } else {
                out.push_str(&rest[start..start + 2 + end + 2]);
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Converts Markdown input to HTML with `<page>` boundaries.
///
/// The input is split at `---` delimiter lines; each chunk converts
/// independently and lands inside its own `<page>` element.
pub(crate) struct MarkdownConvert;

impl PreParse for MarkdownConvert {
    fn name(&self) -> &str {
        "markdown"
    }

    fn apply(&self, filename: &str, input: String) -> Result<String, TransformError> {
        if !filename.ends_with(".md") {
            return Ok(input);
        }

        let mut pages = Vec::new();
        for chunk in split_pages(&input) {
            pages.push(format!("<page>{}</page>", convert_markdown(&chunk)));
        }
        Ok(pages.join("\n"))
    }
}

/// Split markdown into page chunks at `---` delimiter lines.
fn split_pages(input: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in input.lines() {
        if line.trim_end() == "---" {
            chunks.push(std::mem::take(&mut current));
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    chunks.push(current);
    chunks
}

/// Convert one markdown chunk to HTML via the external converter.
fn convert_markdown(chunk: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = pulldown_cmark::Parser::new_ext(chunk, options);
    let mut out = String::with_capacity(chunk.len() * 2);
    html::push_html(&mut out, parser);
    out
}
