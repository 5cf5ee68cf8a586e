//! Bracket balance checking for CoffeeScript documents.
//!
//! Only `paren.*` tokens count, so brackets inside strings, regexes and
//! comments are ignored.

use crate::runtime::{Outbox, WorkerHandler};
use modekit_editor::{Annotation, AnnotationKind, Document, TextDocument};
use modekit_lexer::modes::coffee;
use modekit_lexer::{RuleTableError, Tokenizer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reports the first unbalanced or mismatched bracket.
///
/// After each update it emits `error` with an [`Annotation`] payload, or `ok`
/// when every bracket is closed by its partner.
#[derive(Debug, Clone)]
pub struct BracketLinter {
    tokenizer: Tokenizer,
}

impl BracketLinter {
    pub fn new() -> Result<Self, RuleTableError> {
        Ok(Self {
            tokenizer: coffee::tokenizer()?,
        })
    }

    pub fn check(&self, doc: &dyn Document) -> Option<Annotation> {
        let mut open: Vec<(char, usize, usize)> = Vec::new();
        let mut state = self.tokenizer.start_state();

        for row in 0..doc.len_lines() {
            let line = self.tokenizer.tokenize_line(state, doc.line(row));
            state = line.end_state;
            for token in &line.tokens {
                if !token.kind.is_open_paren() && !token.kind.is_close_paren() {
                    continue;
                }
                for (offset, ch) in token.value.char_indices() {
                    let column = token.start + offset;
                    if let Some(close) = partner(ch) {
                        open.push((close, row, column));
                        continue;
                    }
                    match open.pop() {
                        Some((expected, ..)) if expected == ch => {}
                        Some((expected, ..)) => {
                            let text = format!("expected '{expected}' but found '{ch}'");
                            return Some(error(row, column, text));
                        }
                        None => return Some(error(row, column, format!("unmatched '{ch}'"))),
                    }
                }
            }
        }

        let (close, row, column) = open.first().copied()?;
        let opener = doc.line(row)[column..].chars().next().unwrap_or('?');
        Some(error(row, column, format!("'{opener}' is never closed, expected '{close}'")))
    }
}

impl WorkerHandler for BracketLinter {
    fn init(
        &mut self,
        module: &str,
        classname: &str,
        _tlns: &BTreeMap<String, String>,
        out: &mut Outbox,
    ) {
        if classname != "BracketLinter" {
            out.log(format!("{module}.{classname} is not available, running BracketLinter"));
        }
    }

    fn is_call(&self, command: &str) -> bool {
        command == "lint"
    }

    fn command(
        &mut self,
        doc: &TextDocument,
        name: &str,
        _args: &[Value],
        out: &mut Outbox,
    ) -> Value {
        match name {
            "lint" => serde_json::to_value(self.check(doc)).unwrap_or_default(),
            _ => {
                out.log(format!("unknown command {name:?}"));
                Value::Null
            }
        }
    }

    fn on_update(&mut self, doc: &TextDocument, out: &mut Outbox) {
        match self.check(doc) {
            Some(annotation) => {
                log::debug!("bracket error at {}:{}", annotation.row, annotation.column);
                out.emit("error", serde_json::to_value(annotation).unwrap_or_default());
            }
            None => out.emit("ok", Value::Null),
        }
    }
}

fn partner(open: char) -> Option<char> {
    match open {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

fn error(row: usize, column: usize, text: String) -> Annotation {
    Annotation {
        row,
        column,
        text,
        kind: AnnotationKind::Error,
    }
}
