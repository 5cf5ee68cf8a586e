//! # modekit editor
//!
//! The editing half of a syntax mode: a [`Document`] abstraction with bracket
//! matching, fold range finders, the closing-brace outdent helper and the
//! [`LanguageMode`] hooks that tie them to a tokenizer.
//!
//! Rows and columns are zero based. Columns are byte offsets into the line.
//!
//! ```
//! use modekit_editor::{BracketFoldMode, FoldMode, FoldStyle, Range, TextDocument};
//!
//! let doc = TextDocument::new("function foo() {\n  a()\n  b()\n  c()\n}");
//! let range = BracketFoldMode::cstyle().fold_range_at(&doc, 0, FoldStyle::MarkBegin);
//! assert_eq!(range, Some(Range::new(0, 16, 4, 0)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compiles a pattern literal once and hands out a `&'static Regex`.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

pub mod annotation;
pub mod document;
pub mod fold;
pub mod mode;
pub mod modes;
pub mod outdent;

pub use annotation::{Annotation, AnnotationKind, AnnotationSink};
pub use document::{
    Delta, DeltaAction, Document, DocumentMut, ListenerId, ObservableDocument, TextDocument,
};
pub use fold::{
    BracketFoldMode, FoldMode, FoldStyle, FoldWidget, IndentFoldMode, PythonicFoldMode, fold_ranges,
};
pub use mode::LanguageMode;
pub use outdent::MatchingBraceOutdent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

/// Half-open span between two positions, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start_row: usize, start_column: usize, end_row: usize, end_column: usize) -> Self {
        Self {
            start: Position::new(start_row, start_column),
            end: Position::new(end_row, end_column),
        }
    }

    /// Builds a range from two positions in either order.
    pub fn from_points(a: Position, b: Position) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_multi_line(&self) -> bool {
        self.start.row != self.end.row
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos < self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Leading whitespace of `line`.
pub fn leading_indent(line: &str) -> &str {
    let end = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..end]
}
