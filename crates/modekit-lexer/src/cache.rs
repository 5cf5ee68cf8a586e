//! Per-line token cache that re-tokenizes only what an edit can affect.

use crate::rules::StateId;
use crate::tokenizer::{LineTokens, Tokenizer};
use std::ops::Range;

/// Tokens for every line of a document, kept in sync incrementally.
///
/// Rows are `None` until tokenized. After an edit, call
/// [`TokenizedLines::splice`] to realign rows and then
/// [`TokenizedLines::update`] from the first edited row. Re-tokenization stops
/// at the first cached row that was tokenized from the state the edit now
/// hands it, once every untokenized row has been filled in.
#[derive(Debug, Clone)]
pub struct TokenizedLines {
    tokenizer: Tokenizer,
    lines: Vec<Option<CachedLine>>,
}

#[derive(Debug, Clone)]
struct CachedLine {
    start: StateId,
    tokens: LineTokens,
}

impl TokenizedLines {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            lines: Vec::new(),
        }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, row: usize) -> Option<&LineTokens> {
        self.lines
            .get(row)
            .and_then(Option::as_ref)
            .map(|cached| &cached.tokens)
    }

    /// State row `row` starts in, if the previous row has been tokenized.
    pub fn start_state(&self, row: usize) -> Option<StateId> {
        if row == 0 {
            return Some(self.tokenizer.start_state());
        }
        self.line(row - 1).map(|line| line.end_state)
    }

    /// Replaces `removed` rows at `row` with `inserted` untokenized rows.
    pub fn splice(&mut self, row: usize, removed: usize, inserted: usize) {
        let row = row.min(self.lines.len());
        let end = (row + removed).min(self.lines.len());
        self.lines.splice(row..end, std::iter::repeat_n(None, inserted));
    }

    /// Brings the cache up to date with `lines`, treating `first_dirty` as edited.
    ///
    /// Returns the rows whose tokens were recomputed.
    pub fn update<S: AsRef<str>>(&mut self, lines: &[S], first_dirty: usize) -> Range<usize> {
        self.lines.resize(lines.len(), None);
        if lines.is_empty() {
            return 0..0;
        }

        let first_dirty = first_dirty.min(lines.len() - 1);
        self.lines[first_dirty] = None;

        // Every untokenized row gets visited, not only the edited one.
        let mut row = self
            .lines
            .iter()
            .position(Option::is_none)
            .unwrap_or(first_dirty);
        let last_untokenized = self
            .lines
            .iter()
            .rposition(Option::is_none)
            .unwrap_or(first_dirty);
        let first = row;
        let mut state = self
            .start_state(row)
            .unwrap_or_else(|| self.tokenizer.start_state());

        while row < lines.len() {
            let tokens = self.tokenizer.tokenize_line(state, lines[row].as_ref());
            let start = std::mem::replace(&mut state, tokens.end_state);
            self.lines[row] = Some(CachedLine { start, tokens });
            row += 1;

            let settled = self
                .lines
                .get(row)
                .and_then(Option::as_ref)
                .is_some_and(|next| next.start == state);
            if row > last_untokenized && settled {
                break;
            }
        }

        log::trace!("re-tokenized rows {first}..{row}");
        first..row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RuleDef, RuleTable, TokenKind};

    fn tokenizer() -> Tokenizer {
        let table = RuleTable::builder()
            .rule("start", RuleDef::new("###", TokenKind::Comment).next("comment"))
            .rule("start", RuleDef::new(r"\w+", TokenKind::Identifier))
            .rule("comment", RuleDef::new("###", TokenKind::Comment).merge().next("start"))
            .default_kind("comment", TokenKind::Comment)
            .build()
            .unwrap();
        Tokenizer::new(table)
    }

    #[test]
    fn test_initial_update_tokenizes_everything() {
        let lines = ["a", "###", "b", "###", "c"];
        let mut cache = TokenizedLines::new(tokenizer());
        assert_eq!(cache.update(&lines, 0), 0..5);
        assert_eq!(cache.line(2).unwrap().tokens[0].kind, TokenKind::Comment);
        assert_eq!(cache.line(4).unwrap().tokens[0].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_edit_inside_line_stops_when_state_settles() {
        let mut lines = vec!["a", "b", "c", "d"];
        let mut cache = TokenizedLines::new(tokenizer());
        cache.update(&lines, 0);

        lines[1] = "bb";
        cache.splice(1, 1, 1);
        assert_eq!(cache.update(&lines, 1), 1..2);
        assert_eq!(cache.line(1).unwrap().tokens[0].value, "bb");
    }

    #[test]
    fn test_opening_a_comment_relexes_following_lines() {
        let mut lines = vec!["a", "b", "c", "d"];
        let mut cache = TokenizedLines::new(tokenizer());
        cache.update(&lines, 0);

        lines[1] = "###";
        cache.splice(1, 1, 1);
        assert_eq!(cache.update(&lines, 1), 1..4);
        let comment = cache.tokenizer().state_id("comment");
        assert_eq!(cache.line(3).unwrap().end_state, comment.unwrap());
        assert_eq!(cache.line(3).unwrap().tokens[0].kind, TokenKind::Comment);
    }

    #[test]
    fn test_inserted_lines_are_tokenized() {
        let mut lines = vec!["a", "b"];
        let mut cache = TokenizedLines::new(tokenizer());
        cache.update(&lines, 0);

        lines.insert(1, "x");
        cache.splice(1, 0, 1);
        let changed = cache.update(&lines, 1);
        assert_eq!(changed, 1..2);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.line(1).unwrap().tokens[0].value, "x");
        assert_eq!(cache.line(2).unwrap().tokens[0].value, "b");
    }

    #[test]
    fn test_removed_lines_shrink_the_cache() {
        let mut lines = vec!["a", "###", "b", "###"];
        let mut cache = TokenizedLines::new(tokenizer());
        cache.update(&lines, 0);

        lines.remove(1);
        cache.splice(1, 1, 0);
        cache.update(&lines, 1);
        assert_eq!(cache.len(), 3);
        // "b" is no longer inside the comment; the trailing "###" now opens one.
        assert_eq!(cache.line(1).unwrap().tokens[0].kind, TokenKind::Identifier);
        let comment = cache.tokenizer().state_id("comment").unwrap();
        assert_eq!(cache.line(2).unwrap().end_state, comment);
    }

    #[test]
    fn test_update_fills_every_spliced_row() {
        let lines = ["a", "b", "c", "d", "e"];
        let mut cache = TokenizedLines::new(tokenizer());
        cache.update(&lines, 0);

        cache.splice(1, 1, 1);
        cache.splice(3, 1, 1);
        assert_eq!(cache.update(&lines, 1), 1..4);
        for (row, text) in lines.iter().enumerate() {
            assert_eq!(cache.line(row).unwrap().tokens[0].value, *text);
        }
    }
}
