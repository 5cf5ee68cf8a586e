//! The line tokenizer.

use crate::rules::{Rule, RuleTable, StateId, TokenSpec};
use crate::{Token, TokenKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Tunables for [`Tokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Once a line has produced this many tokens the remainder of the line
    /// becomes a single `text` token and the end state resets to `start`.
    pub max_tokens_per_line: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_line: 2000,
        }
    }
}

/// Tokens of one line and the state the following line starts in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens {
    pub tokens: Vec<Token>,
    pub end_state: StateId,
}

impl LineTokens {
    /// Concatenation of all token values. Always equals the input line.
    pub fn text(&self) -> String {
        self.tokens.iter().map(|t| t.value.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A rule matched zero characters, which would never make progress.
    #[error("rule {rule} of state {state:?} matched the empty string at byte {offset}")]
    EmptyMatch {
        state: String,
        rule: usize,
        offset: usize,
    },
}

/// Runs a [`RuleTable`] over lines of text.
///
/// Cheap to clone; the table is shared.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    table: Arc<RuleTable>,
    config: TokenizerConfig,
}

impl Tokenizer {
    pub fn new(table: RuleTable) -> Self {
        Self::with_config(table, TokenizerConfig::default())
    }

    pub fn with_config(table: RuleTable, config: TokenizerConfig) -> Self {
        Self {
            table: Arc::new(table),
            config,
        }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn start_state(&self) -> StateId {
        self.table.start()
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.table.state_id(name)
    }

    /// Name of `state`, or `"start"` for an id this table does not know.
    pub fn state_name(&self, state: StateId) -> &str {
        self.table
            .state(state)
            .map_or(crate::rules::START, |s| s.name())
    }

    /// Tokenizes `line` starting in `state`.
    ///
    /// A rule that matches zero characters is reported as a warning and the
    /// offending character is consumed as plain text, so this never fails.
    pub fn tokenize_line(&self, state: StateId, line: &str) -> LineTokens {
        match self.scan(state, line, false) {
            Ok(tokens) => tokens,
            // Unreachable in lenient mode; keep the line intact regardless.
            Err(_) => LineTokens {
                tokens: vec![Token::new(TokenKind::Text, line, 0)],
                end_state: state,
            },
        }
    }

    /// Like [`Tokenizer::tokenize_line`] but fails on a zero-length match.
    pub fn try_tokenize_line(&self, state: StateId, line: &str) -> Result<LineTokens, LexError> {
        self.scan(state, line, true)
    }

    /// Tokenizes consecutive lines, threading each end state into the next line.
    pub fn tokenize_lines<'a, I>(&self, lines: I) -> Vec<LineTokens>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.start_state();
        lines
            .into_iter()
            .map(|line| {
                let tokens = self.tokenize_line(state, line);
                state = tokens.end_state;
                tokens
            })
            .collect()
    }

    fn scan(&self, state: StateId, line: &str, strict: bool) -> Result<LineTokens, LexError> {
        let mut current = if self.table.state(state).is_some() {
            state
        } else {
            log::debug!("unknown lexer state {state:?}, falling back to start");
            self.table.start()
        };
        let mut out = TokenSink::default();
        let mut offset = 0;

        while offset < line.len() {
            if out.tokens.len() >= self.config.max_tokens_per_line {
                log::debug!(
                    "line exceeds {} tokens, emitting remainder as text",
                    self.config.max_tokens_per_line
                );
                out.push(TokenKind::Text, &line[offset..], offset, false);
                current = self.table.start();
                break;
            }

            // `current` is always a valid id here.
            let Some(st) = self.table.state(current) else {
                break;
            };
            let rest = &line[offset..];
            let hit = st
                .rules()
                .iter()
                .enumerate()
                .find_map(|(i, rule)| rule.regex.find(rest).map(|m| (i, rule, m.end())));

            match hit {
                Some((index, _, 0)) => {
                    if strict {
                        return Err(LexError::EmptyMatch {
                            state: st.name().to_string(),
                            rule: index,
                            offset,
                        });
                    }
                    log::warn!(
                        "rule {index} of state {:?} matched the empty string at byte {offset}",
                        st.name()
                    );
                    offset += out.fallback(st.default_kind(), rest, offset);
                }
                Some((_, rule, len)) => {
                    emit(&mut out, rule, rest, len, offset);
                    offset += len;
                    if let Some(next) = rule.next {
                        current = next;
                    }
                }
                None => {
                    offset += out.fallback(st.default_kind(), rest, offset);
                }
            }
        }

        Ok(LineTokens {
            tokens: out.tokens,
            end_state: current,
        })
    }
}

fn emit(out: &mut TokenSink, rule: &Rule, rest: &str, len: usize, offset: usize) {
    let matched = &rest[..len];
    match &rule.token {
        TokenSpec::Kind(kind) => out.push(kind.clone(), matched, offset, rule.merge),
        TokenSpec::Classify(classifier) => {
            out.push(classifier.classify(matched), matched, offset, rule.merge)
        }
        TokenSpec::Groups(kinds) => {
            let Some(caps) = rule.regex.captures(rest) else {
                out.push(TokenKind::Text, matched, offset, rule.merge);
                return;
            };
            let mut cursor = 0;
            for (kind, group) in kinds.iter().zip(caps.iter().skip(1)) {
                let Some(group) = group else { continue };
                // Nested groups overlap their parent; the outer one already emitted.
                if group.is_empty() || group.start() < cursor {
                    continue;
                }
                if group.start() > cursor {
                    let gap = &matched[cursor..group.start()];
                    out.push(TokenKind::Text, gap, offset + cursor, rule.merge);
                }
                out.push(kind.clone(), group.as_str(), offset + group.start(), rule.merge);
                cursor = group.end();
            }
            if cursor < matched.len() {
                out.push(TokenKind::Text, &matched[cursor..], offset + cursor, rule.merge);
            }
        }
    }
}

#[derive(Default)]
struct TokenSink {
    tokens: Vec<Token>,
}

impl TokenSink {
    fn push(&mut self, kind: TokenKind, value: &str, start: usize, merge: bool) {
        if merge {
            if let Some(last) = self.tokens.last_mut() {
                if last.kind == kind {
                    last.value.push_str(value);
                    return;
                }
            }
        }
        self.tokens.push(Token::new(kind, value, start));
    }

    /// Consumes one character of `rest` as `kind`, coalescing with a preceding
    /// token of the same kind. Returns the byte length consumed.
    fn fallback(&mut self, kind: &TokenKind, rest: &str, start: usize) -> usize {
        let len = rest.chars().next().map_or(1, char::len_utf8);
        self.push(kind.clone(), &rest[..len], start, true);
        len
    }
}
