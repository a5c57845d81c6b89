use std::fmt;

/// Source location tracking for error reporting.
///
/// Suite files and tabular data files are line-oriented, so a `Span` is a
/// line/column pair rather than a byte range. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub col: usize,
}

impl Span {
    /// Creates a span at the given line and column.
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// Span covering the start of a whole line.
    pub fn line_start(line: usize) -> Self {
        Self { line, col: 1 }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self { line: 1, col: 1 }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_span_with_new() {
        let span = Span::new(3, 7);
        assert_eq!(span.line, 3);
        assert_eq!(span.col, 7);
    }

    #[test]
    fn line_start_sets_column_one() {
        let span = Span::line_start(12);
        assert_eq!(span.line, 12);
        assert_eq!(span.col, 1);
    }

    #[test]
    fn span_default_is_line_one_col_one() {
        let span = Span::default();
        assert_eq!(span.line, 1);
        assert_eq!(span.col, 1);
    }

    #[test]
    fn span_displays_line_and_column() {
        let span = Span::new(4, 9);
        assert_eq!(span.to_string(), "line 4, column 9");
    }

    #[test]
    fn span_equality() {
        assert_eq!(Span::new(1, 1), Span::default());
        assert_ne!(Span::new(2, 1), Span::new(1, 2));
    }
}
