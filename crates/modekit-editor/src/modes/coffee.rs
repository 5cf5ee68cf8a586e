//! CoffeeScript editing mode.

use crate::document::DocumentMut;
use crate::fold::{FoldMode, PythonicFoldMode};
use crate::mode::LanguageMode;
use crate::outdent::MatchingBraceOutdent;
use crate::{Position, Range, leading_indent};
use modekit_lexer::modes::coffee;
use modekit_lexer::{RuleTableError, StateId, Tokenizer};
use std::ops::RangeInclusive;

#[derive(Debug, Clone)]
pub struct CoffeeMode {
    tokenizer: Tokenizer,
    folding: PythonicFoldMode,
    outdent: MatchingBraceOutdent,
}

impl CoffeeMode {
    pub fn new() -> Result<Self, RuleTableError> {
        Ok(Self {
            tokenizer: coffee::tokenizer()?,
            folding: PythonicFoldMode::coffee(),
            outdent: MatchingBraceOutdent::new(),
        })
    }

    fn opens_block(line: &str) -> bool {
        let indenter = regex!(
            r"(?:[({\[=:]|[-=]>|\b(?:else|try|(?:swi|ca)tch(?:\s+[$A-Za-z_\x{7f}-\x{ffff}][$\w\x{7f}-\x{ffff}]*)?|finally))\s*$"
        );
        let block_keyword = regex!(r"^\s*(?:else\b\s*)?(?:if|for|while|loop)\b");
        let then = regex!(r"\bthen\b");
        indenter.is_match(line) || (block_keyword.is_match(line) && !then.is_match(line))
    }
}

impl LanguageMode for CoffeeMode {
    fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn fold_mode(&self) -> &dyn FoldMode {
        &self.folding
    }

    fn line_comment(&self) -> Option<&str> {
        Some("#")
    }

    fn next_line_indent(&self, state: StateId, line: &str, tab: &str) -> String {
        let mut indent = leading_indent(line).to_string();
        let tokens = self.tokenizer.tokenize_line(state, line);
        let ends_in_comment = tokens.tokens.last().is_some_and(|t| t.kind.is_comment());
        if !ends_in_comment && state == self.tokenizer.start_state() && Self::opens_block(line) {
            indent.push_str(tab);
        }
        indent
    }

    fn check_outdent(&self, _state: StateId, line: &str, input: &str) -> bool {
        self.outdent.should_outdent(line, input)
    }

    fn auto_outdent(&self, _state: StateId, doc: &mut dyn DocumentMut, row: usize) -> bool {
        self.outdent.auto_outdent(doc, row)
    }

    /// Adds or strips a `#` after each row's indentation. Here-comment
    /// delimiters (`###`) are left alone.
    fn toggle_comment_lines(
        &self,
        _state: StateId,
        doc: &mut dyn DocumentMut,
        rows: RangeInclusive<usize>,
    ) {
        for row in rows {
            if row >= doc.len_lines() {
                break;
            }
            let line = doc.line(row);
            let body = line.trim_start();
            if body.starts_with("###") && !body.starts_with("####") {
                continue;
            }
            let indent = leading_indent(line).len();
            if line[indent..].starts_with('#') {
                doc.remove(Range::new(row, indent, row, indent + 1));
            } else {
                doc.insert(Position::new(row, indent), "#");
            }
        }
    }
}
