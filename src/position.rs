//! Source positions for error reporting.
//!
//! Every stage downstream of the lexer carries a [`SourcePosition`] so that a
//! malformed annotation can be reported as `file:line:column`.

use std::fmt;
use std::sync::Arc;

/// Source name used when text does not come from a file.
pub const LITERAL_SOURCE: &str = "<literal>";

/// An immutable `(source, line, column)` triple.
///
/// Line `0` / column `1` is the state before any text has been consumed. The
/// lexer advances one line before categorizing each physical line, so the
/// first line of a file is reported as line `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    source: Arc<str>,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    /// Start of the given source.
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self::at(source, 0, 1)
    }

    /// A position at an explicit line and column.
    pub fn at(source: impl Into<Arc<str>>, line: usize, column: usize) -> Self {
        Self {
            source: source.into(),
            line,
            column,
        }
    }

    /// Start of a literal (non-file) source.
    pub fn literal() -> Self {
        Self::new(LITERAL_SOURCE)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_literal(&self) -> bool {
        &*self.source == LITERAL_SOURCE
    }

    /// Returns a position further along in the same source.
    ///
    /// Advancing by one or more lines resets the column to `1`; advancing by
    /// columns only adds to the current column.
    pub fn advance(&self, lines: usize, cols: usize) -> Self {
        let column = if lines == 0 { self.column + cols } else { 1 };
        Self {
            source: Arc::clone(&self.source),
            line: self.line + lines,
            column,
        }
    }

    /// Shorthand for `advance(0, cols)`.
    pub fn advance_cols(&self, cols: usize) -> Self {
        self.advance(0, cols)
    }

    /// Shorthand for `advance(lines, 0)`.
    pub fn advance_lines(&self, lines: usize) -> Self {
        self.advance(lines, 0)
    }
}

impl Default for SourcePosition {
    fn default() -> Self {
        Self::literal()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}
