//! Rule tables: named lexer states and their ordered regex rules.

use crate::TokenKind;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name of the state every document starts in.
pub const START: &str = "start";

/// Compact handle for a lexer state of one [`RuleTable`].
///
/// The `"start"` state always has id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StateId(pub(crate) u16);

impl StateId {
    pub const START: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Decides the kind of a matched span from its text.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> TokenKind;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> TokenKind + Send + Sync,
{
    fn classify(&self, text: &str) -> TokenKind {
        self(text)
    }
}

/// Priority-ordered closed word sets, first match wins.
///
/// ```
/// use modekit_lexer::{Classifier, KeywordMapper, TokenKind};
///
/// let mapper = KeywordMapper::new(TokenKind::Identifier)
///     .tier(TokenKind::ConstantLanguage, "true|false|null")
///     .tier(TokenKind::Keyword, "if|else|null");
///
/// assert_eq!(mapper.classify("if"), TokenKind::Keyword);
/// assert_eq!(mapper.classify("null"), TokenKind::ConstantLanguage);
/// assert_eq!(mapper.classify("iffy"), TokenKind::Identifier);
/// ```
#[derive(Debug, Clone)]
pub struct KeywordMapper {
    tiers: Vec<(TokenKind, HashSet<Box<str>>)>,
    fallback: TokenKind,
}

impl KeywordMapper {
    pub fn new(fallback: TokenKind) -> Self {
        Self {
            tiers: Vec::new(),
            fallback,
        }
    }

    /// Appends a lower-priority tier. `words` is a `|`-separated list.
    pub fn tier(mut self, kind: TokenKind, words: &str) -> Self {
        let set = words
            .split('|')
            .filter(|w| !w.is_empty())
            .map(Box::from)
            .collect();
        self.tiers.push((kind, set));
        self
    }
}

impl Classifier for KeywordMapper {
    fn classify(&self, text: &str) -> TokenKind {
        self.tiers
            .iter()
            .find(|(_, words)| words.contains(text))
            .map_or_else(|| self.fallback.clone(), |(kind, _)| kind.clone())
    }
}

/// How a rule turns its match into tokens.
#[derive(Clone)]
pub enum TokenSpec {
    /// One token of a fixed kind.
    Kind(TokenKind),
    /// One token whose kind is computed from the matched text.
    Classify(Arc<dyn Classifier>),
    /// One token per non-empty capture group, in group order.
    Groups(Vec<TokenKind>),
}

impl fmt::Debug for TokenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSpec::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            TokenSpec::Classify(_) => f.write_str("Classify(..)"),
            TokenSpec::Groups(kinds) => f.debug_tuple("Groups").field(kinds).finish(),
        }
    }
}

/// Uncompiled rule as written by a language definition.
#[derive(Debug, Clone)]
pub struct RuleDef {
    pattern: String,
    token: TokenSpec,
    merge: bool,
    next: Option<String>,
}

impl RuleDef {
    pub fn new(pattern: impl Into<String>, kind: impl Into<TokenKind>) -> Self {
        Self::with_spec(pattern, TokenSpec::Kind(kind.into()))
    }

    pub fn classify(pattern: impl Into<String>, classifier: impl Classifier + 'static) -> Self {
        Self::with_spec(pattern, TokenSpec::Classify(Arc::new(classifier)))
    }

    pub fn groups(pattern: impl Into<String>, kinds: impl IntoIterator<Item = TokenKind>) -> Self {
        Self::with_spec(pattern, TokenSpec::Groups(kinds.into_iter().collect()))
    }

    pub fn with_spec(pattern: impl Into<String>, token: TokenSpec) -> Self {
        Self {
            pattern: pattern.into(),
            token,
            merge: false,
            next: None,
        }
    }

    /// Appends to the previous token when it has the same kind.
    pub fn merge(mut self) -> Self {
        self.merge = true;
        self
    }

    /// Switches to `state` after this rule matches.
    pub fn next(mut self, state: impl Into<String>) -> Self {
        self.next = Some(state.into());
        self
    }
}

/// Compiled rule. The regex is anchored at the start of the slice it is run on.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) regex: Regex,
    pub(crate) pattern: String,
    pub(crate) token: TokenSpec,
    pub(crate) merge: bool,
    pub(crate) next: Option<StateId>,
}

impl Rule {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn token(&self) -> &TokenSpec {
        &self.token
    }

    pub fn merges(&self) -> bool {
        self.merge
    }

    pub fn next_state(&self) -> Option<StateId> {
        self.next
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub(crate) name: String,
    pub(crate) rules: Vec<Rule>,
    pub(crate) default_kind: TokenKind,
}

impl State {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Kind given to characters no rule of this state matches.
    pub fn default_kind(&self) -> &TokenKind {
        &self.default_kind
    }
}

#[derive(Debug, Error)]
pub enum RuleTableError {
    #[error("rule table has no \"start\" state")]
    MissingStart,
    #[error("state {state:?} rule {index}: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        state: String,
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("state {state:?} rule {index}: pattern {pattern:?} matches the empty string")]
    MatchesEmpty {
        state: String,
        index: usize,
        pattern: String,
    },
    #[error("state {state:?} rule {index}: transition to undeclared state {target:?}")]
    UnknownState {
        state: String,
        index: usize,
        target: String,
    },
    #[error("state {state:?} rule {index}: {kinds} group kinds for {groups} capture groups")]
    GroupMismatch {
        state: String,
        index: usize,
        kinds: usize,
        groups: usize,
    },
    #[error("rule table declares more than {} states", u16::MAX)]
    TooManyStates,
}

/// Validated, immutable set of lexer states.
#[derive(Debug, Clone)]
pub struct RuleTable {
    states: Vec<State>,
    by_name: HashMap<String, StateId>,
}

impl RuleTable {
    pub fn builder() -> RuleTableBuilder {
        RuleTableBuilder::default()
    }

    pub fn start(&self) -> StateId {
        StateId::START
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.index())
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, state)| (StateId(i as u16), state))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[derive(Debug, Default)]
struct StateDef {
    name: String,
    rules: Vec<RuleDef>,
    default_kind: Option<TokenKind>,
}

/// Collects state definitions; [`RuleTableBuilder::build`] validates them.
#[derive(Debug, Default)]
pub struct RuleTableBuilder {
    states: Vec<StateDef>,
}

impl RuleTableBuilder {
    fn state_mut(&mut self, name: &str) -> &mut StateDef {
        let pos = match self.states.iter().position(|s| s.name == name) {
            Some(pos) => pos,
            None => {
                self.states.push(StateDef {
                    name: name.to_string(),
                    ..StateDef::default()
                });
                self.states.len() - 1
            }
        };
        &mut self.states[pos]
    }

    /// Appends `rule` to the ordered rule list of `state`, declaring it if needed.
    pub fn rule(mut self, state: &str, rule: RuleDef) -> Self {
        self.state_mut(state).rules.push(rule);
        self
    }

    pub fn rules(mut self, state: &str, rules: impl IntoIterator<Item = RuleDef>) -> Self {
        self.state_mut(state).rules.extend(rules);
        self
    }

    /// Sets the kind of unmatched characters in `state`, declaring it if needed.
    pub fn default_kind(mut self, state: &str, kind: TokenKind) -> Self {
        self.state_mut(state).default_kind = Some(kind);
        self
    }

    pub fn build(mut self) -> Result<RuleTable, RuleTableError> {
        let start = self
            .states
            .iter()
            .position(|s| s.name == START)
            .ok_or(RuleTableError::MissingStart)?;
        let start_def = self.states.remove(start);
        self.states.insert(0, start_def);

        if self.states.len() > u16::MAX as usize {
            return Err(RuleTableError::TooManyStates);
        }
        let by_name: HashMap<String, StateId> = self
            .states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), StateId(i as u16)))
            .collect();

        let mut states = Vec::with_capacity(self.states.len());
        for def in self.states {
            let mut rules = Vec::with_capacity(def.rules.len());
            for (index, rule) in def.rules.into_iter().enumerate() {
                rules.push(compile_rule(&def.name, index, rule, &by_name)?);
            }
            states.push(State {
                name: def.name,
                rules,
                default_kind: def.default_kind.unwrap_or(TokenKind::Text),
            });
        }

        log::debug!("built rule table with {} states", states.len());
        Ok(RuleTable { states, by_name })
    }
}

fn compile_rule(
    state: &str,
    index: usize,
    def: RuleDef,
    by_name: &HashMap<String, StateId>,
) -> Result<Rule, RuleTableError> {
    let regex = Regex::new(&format!("^(?:{})", def.pattern)).map_err(|source| {
        RuleTableError::InvalidPattern {
            state: state.to_string(),
            index,
            pattern: def.pattern.clone(),
            source,
        }
    })?;

    if regex.is_match("") {
        return Err(RuleTableError::MatchesEmpty {
            state: state.to_string(),
            index,
            pattern: def.pattern,
        });
    }

    if let TokenSpec::Groups(kinds) = &def.token {
        let groups = regex.captures_len() - 1;
        if kinds.len() != groups {
            return Err(RuleTableError::GroupMismatch {
                state: state.to_string(),
                index,
                kinds: kinds.len(),
                groups,
            });
        }
    }

    let next = match def.next {
        Some(target) => Some(*by_name.get(&target).ok_or_else(|| {
            RuleTableError::UnknownState {
                state: state.to_string(),
                index,
                target: target.clone(),
            }
        })?),
        None => None,
    };

    Ok(Rule {
        regex,
        pattern: def.pattern,
        token: def.token,
        merge: def.merge,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_state_always_gets_id_zero() {
        let table = RuleTable::builder()
            .rule("string", RuleDef::new("\"", TokenKind::String).next("start"))
            .rule("start", RuleDef::new("\"", TokenKind::String).next("string"))
            .build()
            .unwrap();
        assert_eq!(table.state_id("start"), Some(StateId::START));
        assert_eq!(table.state_id("string"), Some(StateId(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_missing_start_is_rejected() {
        let err = RuleTable::builder()
            .rule("comment", RuleDef::new("#", TokenKind::Comment))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleTableError::MissingStart));
    }

    #[test]
    fn test_empty_matching_pattern_is_rejected() {
        let err = RuleTable::builder()
            .rule("start", RuleDef::new(r"\s*", TokenKind::Text))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleTableError::MatchesEmpty { index: 0, .. }));
    }

    #[test]
    fn test_unknown_next_state_is_rejected() {
        let err = RuleTable::builder()
            .rule("start", RuleDef::new("'''", TokenKind::String).next("qdoc"))
            .build()
            .unwrap_err();
        match err {
            RuleTableError::UnknownState { target, .. } => assert_eq!(target, "qdoc"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = RuleTable::builder()
            .rule("start", RuleDef::new("(unclosed", TokenKind::Text))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuleTableError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_group_kinds_must_cover_every_group() {
        let err = RuleTable::builder()
            .rule(
                "start",
                RuleDef::groups(r"(class)(\s+)(\w+)", [TokenKind::Keyword, TokenKind::Text]),
            )
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RuleTableError::GroupMismatch {
                kinds: 2,
                groups: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_declared_state_without_rules_is_a_valid_target() {
        let table = RuleTable::builder()
            .rule("start", RuleDef::new("###", TokenKind::Comment).next("comment"))
            .default_kind("comment", TokenKind::Comment)
            .build()
            .unwrap();
        let comment = table.state(table.state_id("comment").unwrap()).unwrap();
        assert!(comment.rules().is_empty());
        assert_eq!(comment.default_kind(), &TokenKind::Comment);
    }

    #[test]
    fn test_keyword_mapper_prefers_earlier_tiers() {
        let mapper = KeywordMapper::new(TokenKind::Identifier)
            .tier(TokenKind::InvalidIllegal, "function|var")
            .tier(TokenKind::Keyword, "function|if");
        assert_eq!(mapper.classify("function"), TokenKind::InvalidIllegal);
        assert_eq!(mapper.classify("if"), TokenKind::Keyword);
        assert_eq!(mapper.classify("value"), TokenKind::Identifier);
    }

    #[test]
    fn test_closures_are_classifiers() {
        let upper = |text: &str| {
            if text.chars().all(|c| c.is_ascii_uppercase()) {
                TokenKind::ConstantLanguage
            } else {
                TokenKind::Identifier
            }
        };
        assert_eq!(upper.classify("NAN"), TokenKind::ConstantLanguage);
        assert_eq!(upper.classify("nan"), TokenKind::Identifier);
    }
}
