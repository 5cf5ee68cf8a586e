//! Document interface and the line-vector reference document.

use crate::{Position, Range};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read access to line-oriented text.
///
/// The bracket helpers have default implementations that scan characters
/// line by line; implementors only need `line` and `len_lines`.
pub trait Document {
    /// Text of `row` without its line terminator. Out-of-range rows are empty.
    fn line(&self, row: usize) -> &str;

    fn len_lines(&self) -> usize;

    fn value(&self) -> String {
        let mut out = String::new();
        for row in 0..self.len_lines() {
            if row > 0 {
                out.push('\n');
            }
            out.push_str(self.line(row));
        }
        out
    }

    /// Matches the bracket just before `pos`.
    fn find_matching_bracket(&self, pos: Position) -> Option<Position> {
        let line = self.line(pos.row);
        let column = floor_boundary(line, pos.column);
        let ch = line[..column].chars().next_back()?;
        if closing_of(ch).is_some() {
            self.find_closing_bracket(ch, pos)
        } else if opening_of(ch).is_some() {
            self.find_opening_bracket(ch, pos)
        } else {
            None
        }
    }

    /// Finds the bracket closing `open`, scanning forward from `pos` inclusive.
    fn find_closing_bracket(&self, open: char, pos: Position) -> Option<Position> {
        let close = closing_of(open)?;
        let mut depth = 1usize;
        let mut column = pos.column;
        for row in pos.row..self.len_lines() {
            let line = self.line(row);
            let from = floor_boundary(line, column);
            for (i, ch) in line[from..].char_indices() {
                if ch == open {
                    depth += 1;
                } else if ch == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(Position::new(row, from + i));
                    }
                }
            }
            column = 0;
        }
        None
    }

    /// Finds the bracket opening `close`, where `pos` is just after the closer.
    fn find_opening_bracket(&self, close: char, pos: Position) -> Option<Position> {
        let open = opening_of(close)?;
        let mut depth = 1usize;
        let mut row = pos.row;
        let mut upto = Some(pos.column.saturating_sub(1));
        loop {
            let line = self.line(row);
            let end = floor_boundary(line, upto.unwrap_or(line.len()));
            for (i, ch) in line[..end].char_indices().rev() {
                if ch == close {
                    depth += 1;
                } else if ch == open {
                    depth -= 1;
                    if depth == 0 {
                        return Some(Position::new(row, i));
                    }
                }
            }
            if row == 0 {
                return None;
            }
            row -= 1;
            upto = None;
        }
    }
}

/// Text editing operations. Each returns the position just after the edit.
pub trait DocumentMut: Document {
    fn insert(&mut self, pos: Position, text: &str) -> Position;

    fn remove(&mut self, range: Range) -> Position;

    fn replace(&mut self, range: Range, text: &str) -> Position {
        let start = self.remove(range);
        self.insert(start, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Change subscription.
pub trait ObservableDocument: Document {
    fn on_change(&mut self, listener: Box<dyn FnMut(&Delta)>) -> ListenerId;

    /// Returns false if `id` was not registered.
    fn remove_listener(&mut self, id: ListenerId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaAction {
    Insert,
    Remove,
}

/// One primitive edit, as delivered to change listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub action: DeltaAction,
    pub range: Range,
    /// Inserted or removed text split at line breaks.
    pub lines: Vec<String>,
}

/// A document stored as a vector of lines.
pub struct TextDocument {
    lines: Vec<String>,
    listeners: Vec<(ListenerId, Box<dyn FnMut(&Delta)>)>,
    next_listener: u64,
}

impl TextDocument {
    pub fn new(text: &str) -> Self {
        Self {
            lines: split_lines(text),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn end_position(&self) -> Position {
        let row = self.lines.len() - 1;
        Position::new(row, self.lines[row].len())
    }

    /// Replaces the whole text, notifying listeners with a remove and an insert.
    pub fn set_value(&mut self, text: &str) {
        let all = Range::from_points(Position::default(), self.end_position());
        self.remove(all);
        self.insert(Position::default(), text);
    }

    /// Replays a delta produced by another document.
    pub fn apply_delta(&mut self, delta: &Delta) {
        match delta.action {
            DeltaAction::Insert => {
                self.insert(delta.range.start, &delta.lines.join("\n"));
            }
            DeltaAction::Remove => {
                self.remove(delta.range);
            }
        }
    }

    /// Snaps `pos` into the document and onto a character boundary.
    pub fn clamp(&self, pos: Position) -> Position {
        if pos.row >= self.lines.len() {
            return self.end_position();
        }
        let line = &self.lines[pos.row];
        Position::new(pos.row, floor_boundary(line, pos.column))
    }

    fn emit(&mut self, delta: Delta) {
        for (_, listener) in &mut self.listeners {
            listener(&delta);
        }
    }
}

impl Default for TextDocument {
    fn default() -> Self {
        Self::new("")
    }
}

impl fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextDocument")
            .field("lines", &self.lines)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Document for TextDocument {
    fn line(&self, row: usize) -> &str {
        self.lines.get(row).map_or("", String::as_str)
    }

    fn len_lines(&self) -> usize {
        self.lines.len()
    }

    fn value(&self) -> String {
        self.lines.join("\n")
    }
}

impl DocumentMut for TextDocument {
    fn insert(&mut self, pos: Position, text: &str) -> Position {
        let start = self.clamp(pos);
        if text.is_empty() {
            return start;
        }
        let pieces = split_lines(text);

        let tail = self.lines[start.row].split_off(start.column);
        self.lines[start.row].push_str(&pieces[0]);
        let end = if pieces.len() == 1 {
            self.lines[start.row].push_str(&tail);
            Position::new(start.row, start.column + pieces[0].len())
        } else {
            let mut rest = pieces[1..].to_vec();
            let last = rest.len() - 1;
            let end = Position::new(start.row + rest.len(), rest[last].len());
            rest[last].push_str(&tail);
            let at = start.row + 1;
            self.lines.splice(at..at, rest);
            end
        };

        self.emit(Delta {
            action: DeltaAction::Insert,
            range: Range { start, end },
            lines: pieces,
        });
        end
    }

    fn remove(&mut self, range: Range) -> Position {
        let range = Range::from_points(self.clamp(range.start), self.clamp(range.end));
        let Range { start, end } = range;
        if range.is_empty() {
            return start;
        }

        let removed = if start.row == end.row {
            let line = &mut self.lines[start.row];
            let text = line[start.column..end.column].to_string();
            line.replace_range(start.column..end.column, "");
            vec![text]
        } else {
            let mut removed = Vec::with_capacity(end.row - start.row + 1);
            removed.push(self.lines[start.row][start.column..].to_string());
            let mut drained: Vec<String> = self.lines.drain(start.row + 1..=end.row).collect();
            let last = drained.pop().unwrap_or_default();
            removed.extend(drained);
            removed.push(last[..end.column].to_string());

            let first = &mut self.lines[start.row];
            first.truncate(start.column);
            first.push_str(&last[end.column..]);
            removed
        };

        self.emit(Delta {
            action: DeltaAction::Remove,
            range,
            lines: removed,
        });
        start
    }
}

impl ObservableDocument for TextDocument {
    fn on_change(&mut self, listener: Box<dyn FnMut(&Delta)>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(known, _)| *known != id);
        self.listeners.len() != before
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

fn floor_boundary(line: &str, column: usize) -> usize {
    let mut column = column.min(line.len());
    while !line.is_char_boundary(column) {
        column -= 1;
    }
    column
}

fn closing_of(open: char) -> Option<char> {
    match open {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

fn opening_of(close: char) -> Option<char> {
    match close {
        ')' => Some('('),
        ']' => Some('['),
        '}' => Some('{'),
        _ => None,
    }
}
