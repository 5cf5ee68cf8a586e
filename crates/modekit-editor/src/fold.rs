//! Fold range finders.
//!
//! A [`FoldMode`] answers two questions about a row: whether it opens (or
//! closes) a foldable region, and what that region is. Ranges are never
//! returned when they would start and end on the same row.

use crate::document::Document;
use crate::{Position, Range, leading_indent};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FoldStyle {
    /// Only rows that open a region carry a fold widget.
    #[default]
    MarkBegin,
    /// Rows that close a region fold back to their opener as well.
    MarkBeginEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldWidget {
    Start,
    End,
    None,
}

pub trait FoldMode {
    fn fold_widget(&self, doc: &dyn Document, row: usize, style: FoldStyle) -> FoldWidget;

    fn fold_range_at(&self, doc: &dyn Document, row: usize, style: FoldStyle) -> Option<Range>;
}

/// Every fold that starts on some row of `doc`, in row order.
pub fn fold_ranges(mode: &dyn FoldMode, doc: &dyn Document, style: FoldStyle) -> Vec<Range> {
    (0..doc.len_lines())
        .filter(|&row| mode.fold_widget(doc, row, style) == FoldWidget::Start)
        .filter_map(|row| mode.fold_range_at(doc, row, style))
        .collect()
}

/// Folds delimited by brackets and block comments, located by start and stop
/// marker regexes.
///
/// In the start marker, capture group 1 is the opening bracket and group 2 a
/// block comment opener. In the stop marker, group 1 is the closing bracket and
/// group 2 a block comment closer.
#[derive(Debug, Clone)]
pub struct BracketFoldMode {
    start_marker: Regex,
    stop_marker: Regex,
}

impl BracketFoldMode {
    pub fn new(start_marker: Regex, stop_marker: Regex) -> Self {
        Self {
            start_marker,
            stop_marker,
        }
    }

    /// Markers for C-like languages: `{`/`[` left open at end of line, `/* */`.
    pub fn cstyle() -> Self {
        Self {
            start_marker: regex!(r"(\{|\[)[^\}\]]*$|^\s*(/\*)").clone(),
            stop_marker: regex!(r"^[^\[\{]*(\}|\])|^[\s\*]*(\*/)").clone(),
        }
    }

    fn closing_bracket_block(
        &self,
        doc: &dyn Document,
        bracket: char,
        row: usize,
        column: usize,
    ) -> Option<Range> {
        let end = Position::new(row, column);
        let mut start = doc.find_opening_bracket(bracket, end)?;
        start.column += 1;
        let end = Position::new(row, column - 1);
        (end.row != start.row).then_some(Range { start, end })
    }

    fn comment_block_after(&self, doc: &dyn Document, start: Position) -> Option<Range> {
        let mut column = start.column;
        for row in start.row..doc.len_lines() {
            let line = doc.line(row);
            if let Some(found) = line.get(column..).and_then(|rest| rest.find("*/")) {
                let end = Position::new(row, column + found);
                return (end.row != start.row).then_some(Range { start, end });
            }
            column = 0;
        }
        None
    }

    fn comment_block_before(&self, doc: &dyn Document, end: Position) -> Option<Range> {
        let mut row = end.row;
        let mut upto = Some(end.column);
        loop {
            let line = doc.line(row);
            let head = line.get(..upto.unwrap_or(line.len())).unwrap_or(line);
            if let Some(found) = head.rfind("/*") {
                let start = Position::new(row, found + 2);
                return (end.row != start.row).then_some(Range { start, end });
            }
            if row == 0 {
                return None;
            }
            row -= 1;
            upto = None;
        }
    }
}

impl FoldMode for BracketFoldMode {
    fn fold_widget(&self, doc: &dyn Document, row: usize, style: FoldStyle) -> FoldWidget {
        let line = doc.line(row);
        if self.start_marker.is_match(line) {
            FoldWidget::Start
        } else if style == FoldStyle::MarkBeginEnd && self.stop_marker.is_match(line) {
            FoldWidget::End
        } else {
            FoldWidget::None
        }
    }

    fn fold_range_at(&self, doc: &dyn Document, row: usize, style: FoldStyle) -> Option<Range> {
        let line = doc.line(row);

        if let Some(caps) = self.start_marker.captures(line) {
            if let Some(bracket) = caps.get(1) {
                let ch = bracket.as_str().chars().next()?;
                return opening_bracket_block(self, doc, ch, row, bracket.start());
            }
            let whole = caps.get(0)?;
            return self.comment_block_after(doc, Position::new(row, whole.end()));
        }

        if style != FoldStyle::MarkBeginEnd {
            return None;
        }

        let caps = self.stop_marker.captures(line)?;
        if let Some(bracket) = caps.get(1) {
            let ch = bracket.as_str().chars().next()?;
            return self.closing_bracket_block(doc, ch, row, bracket.end());
        }
        let closer = caps.get(2)?;
        self.comment_block_before(doc, Position::new(row, closer.start()))
    }
}

/// Folds by indentation, plus runs of line comments.
#[derive(Debug, Clone)]
pub struct IndentFoldMode {
    comment_prefix: String,
}

impl IndentFoldMode {
    pub fn new(comment_prefix: impl Into<String>) -> Self {
        Self {
            comment_prefix: comment_prefix.into(),
        }
    }

    /// Rows after `row` indented deeper than it. Blank rows do not end the block.
    pub fn indentation_block(&self, doc: &dyn Document, row: usize) -> Option<Range> {
        indentation_block(doc, row, None)
    }

    /// Consecutive rows whose first non-blank text is the comment prefix.
    pub fn comment_block(&self, doc: &dyn Document, row: usize) -> Option<Range> {
        if !self.is_comment(doc.line(row)) {
            return None;
        }
        let mut end_row = row;
        for next in row + 1..doc.len_lines() {
            let line = doc.line(next);
            if indent_level(line).is_none() {
                continue;
            }
            if !self.is_comment(line) {
                break;
            }
            end_row = next;
        }
        (end_row > row)
            .then(|| Range::new(row, doc.line(row).len(), end_row, doc.line(end_row).len()))
    }

    fn is_comment(&self, line: &str) -> bool {
        !self.comment_prefix.is_empty() && line.trim_start().starts_with(&self.comment_prefix)
    }
}

impl FoldMode for IndentFoldMode {
    fn fold_widget(&self, doc: &dyn Document, row: usize, _style: FoldStyle) -> FoldWidget {
        let line = doc.line(row);
        let Some(indent) = indent_level(line) else {
            return FoldWidget::None;
        };
        let prev = row.checked_sub(1).map(|r| doc.line(r));
        let next = doc.line(row + 1);

        if self.is_comment(line) {
            let prev_is_comment =
                prev.is_some_and(|p| self.is_comment(p) && indent_level(p) == Some(indent));
            let next_is_comment = self.is_comment(next) && indent_level(next) == Some(indent);
            return if !prev_is_comment && next_is_comment {
                FoldWidget::Start
            } else {
                FoldWidget::None
            };
        }

        match indent_level(next) {
            Some(next_indent) if next_indent > indent => FoldWidget::Start,
            _ => FoldWidget::None,
        }
    }

    fn fold_range_at(&self, doc: &dyn Document, row: usize, _style: FoldStyle) -> Option<Range> {
        self.indentation_block(doc, row)
            .or_else(|| self.comment_block(doc, row))
    }
}

/// Folds chosen by a start marker: a trailing `[` or `{` folds to its closer,
/// any other marker folds the deeper-indented rows below it.
///
/// Rows without a marker never fold, however the next row is indented.
#[derive(Debug, Clone)]
pub struct PythonicFoldMode {
    start_marker: Regex,
}

impl PythonicFoldMode {
    /// `markers` is a regex alternation of block openers, such as `->|=>`.
    pub fn new(markers: &str) -> Result<Self, regex::Error> {
        let start_marker = Regex::new(&format!(r"(?:([\[{{])|({markers}))(?:\s*)(?:#.*)?$"))?;
        Ok(Self { start_marker })
    }

    /// Markers for CoffeeScript: assignments, arrows and class headers.
    pub fn coffee() -> Self {
        Self {
            start_marker: regex!(r"(?:([\[{])|(=|=>|->|\s*class [^#]*))(?:\s*)(?:#.*)?$").clone(),
        }
    }
}

impl FoldMode for PythonicFoldMode {
    fn fold_widget(&self, doc: &dyn Document, row: usize, _style: FoldStyle) -> FoldWidget {
        if self.start_marker.is_match(doc.line(row)) {
            FoldWidget::Start
        } else {
            FoldWidget::None
        }
    }

    fn fold_range_at(&self, doc: &dyn Document, row: usize, _style: FoldStyle) -> Option<Range> {
        let caps = self.start_marker.captures(doc.line(row))?;
        if let Some(bracket) = caps.get(1) {
            let ch = bracket.as_str().chars().next()?;
            return opening_bracket_block(self, doc, ch, row, bracket.start());
        }
        let marker = caps.get(2)?;
        indentation_block(doc, row, Some(marker.end()))
    }
}

/// From just after the opener at `row`/`column` to its closer. A closer on a
/// row that opens another fold ends the range on the row before.
fn opening_bracket_block(
    mode: &dyn FoldMode,
    doc: &dyn Document,
    bracket: char,
    row: usize,
    column: usize,
) -> Option<Range> {
    let start = Position::new(row, column + 1);
    let mut end = doc.find_closing_bracket(bracket, start)?;
    if end.row > start.row
        && mode.fold_widget(doc, end.row, FoldStyle::MarkBegin) == FoldWidget::Start
    {
        end.row -= 1;
        end.column = doc.line(end.row).len();
    }
    (end.row != start.row).then_some(Range { start, end })
}

/// Rows after `row` indented deeper than it, folded from `start_column` (end of
/// the line by default).
fn indentation_block(doc: &dyn Document, row: usize, start_column: Option<usize>) -> Option<Range> {
    let start_level = indent_level(doc.line(row))?;
    let start_column = start_column.unwrap_or(doc.line(row).len());
    let mut end_row = row;
    for next in row + 1..doc.len_lines() {
        match indent_level(doc.line(next)) {
            None => continue,
            Some(level) if level <= start_level => break,
            Some(_) => end_row = next,
        }
    }
    (end_row > row).then(|| Range::new(row, start_column, end_row, doc.line(end_row).len()))
}

/// Byte width of the leading whitespace, or `None` for a blank line.
fn indent_level(line: &str) -> Option<usize> {
    if line.trim().is_empty() {
        None
    } else {
        Some(leading_indent(line).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextDocument;

    #[test]
    fn test_function_body_folds_between_braces() {
        let doc = TextDocument::new("function foo() {\n    a();\n    b();\n    c();\n}");
        let mode = BracketFoldMode::cstyle();
        assert_eq!(mode.fold_widget(&doc, 0, FoldStyle::MarkBegin), FoldWidget::Start);
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 16, 4, 0))
        );
    }

    #[test]
    fn test_closer_that_reopens_ends_on_previous_line() {
        let doc = TextDocument::new("if (a) {\n  x();\n} else {\n  y();\n}");
        let mode = BracketFoldMode::cstyle();
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 8, 1, 6))
        );
        assert_eq!(
            mode.fold_range_at(&doc, 2, FoldStyle::MarkBegin),
            Some(Range::new(2, 8, 4, 0))
        );
    }

    #[test]
    fn test_single_line_brackets_do_not_fold() {
        let doc = TextDocument::new("let v = [1, 2];\nlet w = {};");
        let mode = BracketFoldMode::cstyle();
        assert_eq!(mode.fold_widget(&doc, 0, FoldStyle::MarkBegin), FoldWidget::None);
        assert_eq!(mode.fold_range_at(&doc, 1, FoldStyle::MarkBegin), None);
    }

    #[test]
    fn test_unclosed_bracket_has_no_fold() {
        let doc = TextDocument::new("fn f() {\n  body");
        let mode = BracketFoldMode::cstyle();
        assert_eq!(mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin), None);
    }

    #[test]
    fn test_mark_begin_end_folds_back_from_closer() {
        let doc = TextDocument::new("list = [\n  1,\n  2\n]");
        let mode = BracketFoldMode::cstyle();
        assert_eq!(mode.fold_widget(&doc, 3, FoldStyle::MarkBegin), FoldWidget::None);
        assert_eq!(mode.fold_widget(&doc, 3, FoldStyle::MarkBeginEnd), FoldWidget::End);
        assert_eq!(mode.fold_range_at(&doc, 3, FoldStyle::MarkBegin), None);
        assert_eq!(
            mode.fold_range_at(&doc, 3, FoldStyle::MarkBeginEnd),
            Some(Range::new(0, 8, 3, 0))
        );
    }

    #[test]
    fn test_block_comment_folds() {
        let doc = TextDocument::new("/*\n * docs\n */\nint x;");
        let mode = BracketFoldMode::cstyle();
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 2, 2, 1))
        );
        assert_eq!(
            mode.fold_range_at(&doc, 2, FoldStyle::MarkBeginEnd),
            Some(Range::new(0, 2, 2, 1))
        );
    }

    #[test]
    fn test_indentation_block_ends_at_last_deeper_line() {
        let doc = TextDocument::new("outer\n  a\n  b\nnext");
        let mode = IndentFoldMode::new("#");
        assert_eq!(mode.fold_widget(&doc, 0, FoldStyle::MarkBegin), FoldWidget::Start);
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 5, 2, 3))
        );
    }

    #[test]
    fn test_blank_lines_do_not_end_an_indentation_block() {
        let doc = TextDocument::new("f = ->\n  a\n\n   \n  b\nc");
        let mode = IndentFoldMode::new("#");
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 6, 4, 3))
        );
        assert_eq!(mode.fold_range_at(&doc, 2, FoldStyle::MarkBegin), None);
        assert_eq!(mode.fold_range_at(&doc, 5, FoldStyle::MarkBegin), None);
    }

    #[test]
    fn test_comment_runs_fold_together() {
        let doc = TextDocument::new("# one\n# two\n\n# three\nx = 1");
        let mode = IndentFoldMode::new("#");
        assert_eq!(mode.fold_widget(&doc, 0, FoldStyle::MarkBegin), FoldWidget::Start);
        assert_eq!(mode.fold_widget(&doc, 1, FoldStyle::MarkBegin), FoldWidget::None);
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 5, 3, 7))
        );
    }

    #[test]
    fn test_trailing_bracket_folds_to_its_closer() {
        let doc = TextDocument::new("x = [\n1,\n2\n]");
        let mode = PythonicFoldMode::coffee();
        assert_eq!(mode.fold_widget(&doc, 0, FoldStyle::MarkBegin), FoldWidget::Start);
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 5, 3, 0))
        );
    }

    #[test]
    fn test_marker_folds_indented_rows_from_its_end() {
        let doc = TextDocument::new("f = -> # body\n  a\n  b\nc");
        let mode = PythonicFoldMode::coffee();
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 6, 2, 3))
        );

        let doc = TextDocument::new("class Point\n  x: 0\n");
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 11, 1, 6))
        );
    }

    #[test]
    fn test_rows_without_a_marker_do_not_fold() {
        let doc = TextDocument::new("plain\n  deeper\nback");
        let mode = PythonicFoldMode::coffee();
        assert_eq!(mode.fold_widget(&doc, 0, FoldStyle::MarkBegin), FoldWidget::None);
        assert_eq!(mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin), None);
    }

    #[test]
    fn test_custom_markers() {
        let doc = TextDocument::new("def f():\n    pass");
        let mode = PythonicFoldMode::new(":").unwrap();
        assert_eq!(
            mode.fold_range_at(&doc, 0, FoldStyle::MarkBegin),
            Some(Range::new(0, 8, 1, 8))
        );
        assert!(PythonicFoldMode::new("(").is_err());
    }

    #[test]
    fn test_fold_ranges_lists_every_start() {
        let doc = TextDocument::new("a = {\n  b: [\n    1\n  ]\n}");
        let ranges = fold_ranges(&BracketFoldMode::cstyle(), &doc, FoldStyle::MarkBegin);
        assert_eq!(ranges, [Range::new(0, 5, 4, 0), Range::new(1, 6, 3, 2)]);
    }
}
