//! # modekit lexer
//!
//! Line-oriented, rule-table driven tokenizer for syntax-aware editing modes.
//!
//! ## Overview
//!
//! A language is described by a [`RuleTable`]: a set of named states, each with
//! an ordered list of regex rules. The [`Tokenizer`] walks one line at a time,
//! trying the rules of the current state anchored at the current offset, and
//! returns the tokens of the line together with the state the next line must
//! start in. Multi-line constructs (block comments, triple-quoted strings) are
//! nothing more than states and transitions in the table.
//!
//! ```text
//!            tokenize_line(state, "### open")
//!  ┌───────┐ ─────────────────────────────────► ┌──────────────────────────┐
//!  │ start │                                     │ tokens + end_state       │
//!  └───────┘ ◄───────────────────────────────── │ ("comment" for next line) │
//!                 end_state of line N            └──────────────────────────┘
//!                 = start of line N + 1
//! ```
//!
//! ## Examples
//!
//! ```
//! use modekit_lexer::{RuleDef, RuleTable, TokenKind, Tokenizer};
//!
//! let table = RuleTable::builder()
//!     .rule("start", RuleDef::new(r"\d+", TokenKind::ConstantNumeric))
//!     .rule("start", RuleDef::new(r"/\*", TokenKind::Comment).next("comment"))
//!     .rule("comment", RuleDef::new(r".*?\*/", TokenKind::Comment).next("start"))
//!     .rule("comment", RuleDef::new(r".+", TokenKind::Comment))
//!     .build()?;
//! let tokenizer = Tokenizer::new(table);
//!
//! let first = tokenizer.tokenize_line(tokenizer.start_state(), "42 /* open");
//! assert_eq!(tokenizer.state_name(first.end_state), "comment");
//!
//! let second = tokenizer.tokenize_line(first.end_state, "still */ 7");
//! assert_eq!(second.end_state, tokenizer.start_state());
//! # Ok::<(), modekit_lexer::RuleTableError>(())
//! ```
//!
//! Token kinds are an enumerated set of common scopes with an escape hatch
//! ([`TokenKind::Other`]) for anything a rule table wants to invent.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

pub mod cache;
pub mod modes;
pub mod rules;
pub mod tokenizer;

pub use cache::TokenizedLines;
pub use rules::{
    Classifier, KeywordMapper, RuleDef, RuleTable, RuleTableBuilder, RuleTableError, StateId,
    TokenSpec,
};
pub use tokenizer::{LexError, LineTokens, Tokenizer, TokenizerConfig};

/// Classification of a token.
///
/// Serialized as its dotted scope name (`"constant.numeric"`, `"paren.lparen"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TokenKind {
    Text,
    Comment,
    CommentRegex,
    String,
    StringRegex,
    ConstantNumeric,
    ConstantLanguage,
    ConstantEscape,
    Keyword,
    KeywordOperator,
    Identifier,
    Variable,
    VariableLanguage,
    VariableParameter,
    InvalidIllegal,
    SupportClass,
    SupportFunction,
    StorageType,
    FunctionName,
    Punctuation,
    ParenOpen,
    ParenClose,
    /// Any scope name not covered above.
    Other(Cow<'static, str>),
}

static NAMED_KINDS: &[(TokenKind, &str)] = &[
    (TokenKind::Text, "text"),
    (TokenKind::Comment, "comment"),
    (TokenKind::CommentRegex, "comment.regex"),
    (TokenKind::String, "string"),
    (TokenKind::StringRegex, "string.regex"),
    (TokenKind::ConstantNumeric, "constant.numeric"),
    (TokenKind::ConstantLanguage, "constant.language"),
    (TokenKind::ConstantEscape, "constant.character.escape"),
    (TokenKind::Keyword, "keyword"),
    (TokenKind::KeywordOperator, "keyword.operator"),
    (TokenKind::Identifier, "identifier"),
    (TokenKind::Variable, "variable"),
    (TokenKind::VariableLanguage, "variable.language"),
    (TokenKind::VariableParameter, "variable.parameter"),
    (TokenKind::InvalidIllegal, "invalid.illegal"),
    (TokenKind::SupportClass, "support.class"),
    (TokenKind::SupportFunction, "support.function"),
    (TokenKind::StorageType, "storage.type"),
    (TokenKind::FunctionName, "entity.name.function"),
    (TokenKind::Punctuation, "punctuation.operator"),
    (TokenKind::ParenOpen, "paren.lparen"),
    (TokenKind::ParenClose, "paren.rparen"),
];

impl TokenKind {
    /// Dotted scope name of this kind.
    pub fn as_str(&self) -> &str {
        if let TokenKind::Other(name) = self {
            return name;
        }
        NAMED_KINDS
            .iter()
            .find(|(kind, _)| kind == self)
            .map_or("text", |(_, name)| name)
    }

    /// Looks up a kind by scope name. Unknown names become [`TokenKind::Other`].
    pub fn from_name(name: &str) -> Self {
        NAMED_KINDS
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(kind, _)| kind.clone())
            .unwrap_or_else(|| TokenKind::Other(Cow::Owned(name.to_string())))
    }

    pub fn is_comment(&self) -> bool {
        self.as_str().starts_with("comment")
    }

    pub fn is_string(&self) -> bool {
        self.as_str().starts_with("string")
    }

    /// `paren.lparen` and any `*.lparen` scope.
    pub fn is_open_paren(&self) -> bool {
        self.as_str().ends_with("lparen")
    }

    /// `paren.rparen` and any `*.rparen` scope.
    pub fn is_close_paren(&self) -> bool {
        self.as_str().ends_with("rparen")
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for TokenKind {
    fn from(name: &str) -> Self {
        TokenKind::from_name(name)
    }
}

impl From<String> for TokenKind {
    fn from(name: String) -> Self {
        TokenKind::from_name(&name)
    }
}

impl From<TokenKind> for String {
    fn from(kind: TokenKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A classified span of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte column of the first character of `value` within its line.
    pub start: usize,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, start: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            start,
        }
    }

    /// Byte column one past the last character of the token.
    pub fn end(&self) -> usize {
        self.start + self.value.len()
    }
}
