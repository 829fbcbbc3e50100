//! Line range parsing for code tags.

use crate::error::SnippetError;

/// A 1-based, inclusive line range of the form `"[+|-]start:[+|-]end"`.
///
/// A missing bound parses as `0`, meaning "unset": the requesting tag
/// resolves it from its own context (`0` start means the first line, `0`
/// end means the last line of the file). Explicit bounds must be
/// non-negative and ordered `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// First line of the excerpt (1-based; 0 = caller default).
    pub start: usize,
    /// Last line of the excerpt (1-based, inclusive; 0 = caller default).
    pub end: usize,
}

impl Range {
    /// Parse a range spec.
    ///
    /// ```
    /// use folio_snippets::Range;
    ///
    /// assert_eq!(Range::parse("1:2").unwrap(), Range { start: 1, end: 2 });
    /// assert_eq!(Range::parse(":2").unwrap(), Range { start: 0, end: 2 });
    /// assert_eq!(Range::parse("1:").unwrap(), Range { start: 1, end: 0 });
    /// assert!(Range::parse("").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::InvalidRange`] when the spec is empty, has
    /// no `:` separator, a bound is negative or non-numeric, or the
    /// explicit bounds are out of order.
    pub fn parse(spec: &str) -> Result<Self, SnippetError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(SnippetError::invalid_range(spec, "empty range"));
        }
        let Some((start_part, end_part)) = trimmed.split_once(':') else {
            return Err(SnippetError::invalid_range(spec, "missing ':' separator"));
        };
        if end_part.contains(':') {
            return Err(SnippetError::invalid_range(spec, "more than one ':'"));
        }

        let start = parse_bound(spec, start_part)?;
        let end = parse_bound(spec, end_part)?;

        // Ordering is only checkable when both bounds are explicit
        if !start_part.trim().is_empty() && !end_part.trim().is_empty() && start > end {
            return Err(SnippetError::invalid_range(
                spec,
                format!("start {start} is after end {end}"),
            ));
        }

        Ok(Self { start, end })
    }

    /// True when the start bound was left to the caller's default.
    #[must_use]
    pub fn open_start(&self) -> bool {
        self.start == 0
    }

    /// True when the end bound was left to the caller's default.
    #[must_use]
    pub fn open_end(&self) -> bool {
        self.end == 0
    }
}

/// Parse one bound: empty means unset (0); an optional sign is accepted
/// but the value must be non-negative.
fn parse_bound(spec: &str, part: &str) -> Result<usize, SnippetError> {
    let part = part.trim();
    if part.is_empty() {
        return Ok(0);
    }
    let value: i64 = part
        .parse()
        .map_err(|_| SnippetError::invalid_range(spec, format!("bound {part:?} is not a number")))?;
    usize::try_from(value)
        .map_err(|_| SnippetError::invalid_range(spec, format!("bound {part:?} is negative")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_bounds() {
        assert_eq!(Range::parse("1:2").unwrap(), Range { start: 1, end: 2 });
    }

    #[test]
    fn test_parse_open_start() {
        let range = Range::parse(":2").unwrap();
        assert_eq!(range, Range { start: 0, end: 2 });
        assert!(range.open_start());
        assert!(!range.open_end());
    }

    #[test]
    fn test_parse_open_end() {
        let range = Range::parse("1:").unwrap();
        assert_eq!(range, Range { start: 1, end: 0 });
        assert!(range.open_end());
    }

    #[test]
    fn test_parse_explicit_plus_sign() {
        assert_eq!(Range::parse("+3:+7").unwrap(), Range { start: 3, end: 7 });
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert!(matches!(
            Range::parse(""),
            Err(SnippetError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_parse_missing_colon() {
        let err = Range::parse("12").unwrap_err();
        assert!(err.to_string().contains("missing ':'"));
    }

    #[test]
    fn test_parse_negative_bound() {
        let err = Range::parse("-1:5").unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_parse_non_numeric_bound() {
        assert!(Range::parse("a:5").is_err());
    }

    #[test]
    fn test_parse_out_of_order() {
        let err = Range::parse("5:2").unwrap_err();
        assert!(err.to_string().contains("after end"));
    }

    #[test]
    fn test_parse_double_colon() {
        assert!(Range::parse("1:2:3").is_err());
    }

    #[test]
    fn test_open_bounds_skip_ordering_check() {
        // "5:" leaves end at the caller default; 5 > 0 must not error
        assert_eq!(Range::parse("5:").unwrap(), Range { start: 5, end: 0 });
    }
}
