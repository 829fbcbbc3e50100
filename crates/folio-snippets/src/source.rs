//! Eager snippet extraction from one source file.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use crate::conventions::{CommentStyle, Conventions};
use crate::error::SnippetError;
use crate::range::Range;

/// A source file with all of its named snippets extracted.
///
/// Construction scans the file once and materializes every
/// `snippet: NAME` pair into a name→excerpt map, so repeated lookups and
/// later range queries never re-scan the content. Marker lines are never
/// part of any excerpt; nested snippet markers are stripped as well.
#[derive(Debug)]
pub struct SnippetSource {
    lines: Vec<String>,
    snippets: BTreeMap<String, String>,
}

impl SnippetSource {
    /// Scan `content`, extracting every named snippet.
    ///
    /// The marker comment style is chosen from `extension` via
    /// `conventions` (e.g. `// snippet: demo` for `rs`,
    /// `<!-- snippet: demo -->` for `html`).
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::DuplicateName`] when a snippet name occurs
    /// in more than one pair, and [`SnippetError::UnbalancedMarker`] when
    /// a marker is still open at end of file.
    pub fn parse(
        content: &str,
        extension: &str,
        conventions: &Conventions,
    ) -> Result<Self, SnippetError> {
        let marker = marker_regex(conventions.style_for(extension));
        let lines: Vec<String> = content.lines().map(str::to_owned).collect();

        let mut snippets = BTreeMap::new();
        // Open markers by name; nesting and interleaving are permitted
        let mut open: HashMap<String, usize> = HashMap::new();

        for (idx, line) in lines.iter().enumerate() {
            let Some(captures) = marker.captures(line) else {
                continue;
            };
            let name = captures[1].to_owned();

            if let Some(start) = open.remove(&name) {
                if snippets.contains_key(&name) {
                    return Err(SnippetError::DuplicateName { name });
                }
                let excerpt: Vec<&str> = lines[start + 1..idx]
                    .iter()
                    .filter(|l| !marker.is_match(l))
                    .map(String::as_str)
                    .collect();
                snippets.insert(name, excerpt.join("\n"));
            } else if snippets.contains_key(&name) {
                // A third occurrence re-opens an already-extracted name
                return Err(SnippetError::DuplicateName { name });
            } else {
                open.insert(name, idx);
            }
        }

        if let Some(name) = open.into_keys().next() {
            return Err(SnippetError::UnbalancedMarker { name });
        }

        Ok(Self { lines, snippets })
    }

    /// Look up a named snippet's excerpt.
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::UnknownName`] when the file defines no
    /// snippet with that name.
    pub fn named(&self, name: &str) -> Result<&str, SnippetError> {
        self.snippets
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| SnippetError::UnknownName {
                name: name.to_owned(),
            })
    }

    /// The names of all snippets defined in this file, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snippets.keys().map(String::as_str)
    }

    /// Resolve a line range against this file.
    ///
    /// Open bounds resolve to the file's edges: start `0` means line 1,
    /// end `0` means the last line. Out-of-bounds ranges are clamped.
    #[must_use]
    pub fn lines(&self, range: Range) -> String {
        let total = self.lines.len();
        let start = range.start.max(1);
        let end = if range.open_end() {
            total
        } else {
            range.end.min(total)
        };
        if start > end || start > total {
            return String::new();
        }
        self.lines[start - 1..end].join("\n")
    }

    /// The file's full content, line-joined.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Build the marker-matching regex for a comment style.
fn marker_regex(style: CommentStyle) -> Regex {
    let pattern = match style {
        CommentStyle::Line(leader) => {
            format!(r"^\s*{}\s*snippet:\s*(\S+)\s*$", regex::escape(leader))
        }
        CommentStyle::Html => r"^\s*<!--\s*snippet:\s*(\S+)\s*-->\s*$".to_owned(),
    };
    // The pattern is assembled from escaped literals; it always compiles
    Regex::new(&pattern).expect("marker pattern must compile")
}
