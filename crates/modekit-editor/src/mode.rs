//! Language mode hooks.

use crate::document::DocumentMut;
use crate::fold::FoldMode;
use crate::leading_indent;
use modekit_lexer::{StateId, Tokenizer};
use std::ops::RangeInclusive;

/// Everything an editor needs to know about one language.
///
/// Only the tokenizer and fold mode are required; the editing hooks default to
/// keeping the current indentation and doing nothing.
pub trait LanguageMode {
    fn tokenizer(&self) -> &Tokenizer;

    fn fold_mode(&self) -> &dyn FoldMode;

    fn line_comment(&self) -> Option<&str> {
        None
    }

    /// Indentation for the line following `line`, which starts in `state`.
    fn next_line_indent(&self, _state: StateId, line: &str, _tab: &str) -> String {
        leading_indent(line).to_string()
    }

    /// Whether typing `input` on the whitespace-only `line` should re-indent it.
    fn check_outdent(&self, _state: StateId, _line: &str, _input: &str) -> bool {
        false
    }

    fn auto_outdent(&self, _state: StateId, _doc: &mut dyn DocumentMut, _row: usize) -> bool {
        false
    }

    fn toggle_comment_lines(
        &self,
        _state: StateId,
        _doc: &mut dyn DocumentMut,
        _rows: RangeInclusive<usize>,
    ) {
    }
}
