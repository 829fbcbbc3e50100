//! Per-extension comment conventions for snippet markers.

use std::collections::HashMap;

/// How a `snippet: NAME` marker is written in a given file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// A line comment with the given leader, e.g. `// snippet: demo`.
    Line(&'static str),
    /// An HTML comment, `<!-- snippet: demo -->`.
    Html,
}

/// Extension → comment-style table for snippet markers.
///
/// The defaults cover the common source types of a technical book; hosts
/// can extend the table, and sub-parsers created for includes inherit the
/// caller's conventions unchanged.
#[derive(Debug, Clone)]
pub struct Conventions {
    styles: HashMap<String, CommentStyle>,
}

impl Default for Conventions {
    fn default() -> Self {
        let mut styles = HashMap::new();
        for ext in ["rs", "go", "c", "h", "cpp", "java", "js", "ts", "swift"] {
            styles.insert(ext.to_owned(), CommentStyle::Line("//"));
        }
        for ext in ["py", "sh", "rb", "toml", "yaml", "yml", "dockerfile"] {
            styles.insert(ext.to_owned(), CommentStyle::Line("#"));
        }
        for ext in ["sql", "lua", "hs"] {
            styles.insert(ext.to_owned(), CommentStyle::Line("--"));
        }
        for ext in ["html", "htm", "xml", "md", "svg"] {
            styles.insert(ext.to_owned(), CommentStyle::Html);
        }
        Self { styles }
    }
}

impl Conventions {
    /// Look up the marker style for a file extension (case-insensitive).
    ///
    /// Unknown extensions fall back to `//` line comments.
    #[must_use]
    pub fn style_for(&self, extension: &str) -> CommentStyle {
        self.styles
            .get(&extension.to_ascii_lowercase())
            .copied()
            .unwrap_or(CommentStyle::Line("//"))
    }

    /// Register or override the style for an extension.
    pub fn set(&mut self, extension: impl Into<String>, style: CommentStyle) {
        self.styles.insert(extension.into().to_ascii_lowercase(), style);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_styles() {
        let conventions = Conventions::default();

        assert_eq!(conventions.style_for("rs"), CommentStyle::Line("//"));
        assert_eq!(conventions.style_for("py"), CommentStyle::Line("#"));
        assert_eq!(conventions.style_for("sql"), CommentStyle::Line("--"));
        assert_eq!(conventions.style_for("html"), CommentStyle::Html);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let conventions = Conventions::default();

        assert_eq!(conventions.style_for("RS"), CommentStyle::Line("//"));
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let conventions = Conventions::default();

        assert_eq!(conventions.style_for("zig"), CommentStyle::Line("//"));
    }

    #[test]
    fn test_set_overrides() {
        let mut conventions = Conventions::default();
        conventions.set("zig", CommentStyle::Line("//"));
        conventions.set("vim", CommentStyle::Line("\""));

        assert_eq!(conventions.style_for("vim"), CommentStyle::Line("\""));
    }
}
