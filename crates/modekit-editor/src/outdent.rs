//! Re-indents a line when a closing brace is typed on it.

use crate::document::{Document, DocumentMut};
use crate::{Position, Range, leading_indent};

/// Outdent rule for brace-delimited languages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingBraceOutdent;

impl MatchingBraceOutdent {
    pub fn new() -> Self {
        Self
    }

    /// True when `line` is whitespace only and `input` starts with `}` after
    /// optional whitespace.
    pub fn should_outdent(&self, line: &str, input: &str) -> bool {
        !line.is_empty()
            && line.chars().all(char::is_whitespace)
            && input.trim_start().starts_with('}')
    }

    /// Indentation row `row` should take so its leading `}` lines up with the
    /// row holding the matching `{`.
    pub fn compute_outdent<D: Document + ?Sized>(&self, doc: &D, row: usize) -> Option<String> {
        let column = closer_column(doc.line(row))?;
        let open = doc.find_matching_bracket(Position::new(row, column))?;
        if open.row == row {
            return None;
        }
        Some(leading_indent(doc.line(open.row)).to_string())
    }

    /// Applies [`MatchingBraceOutdent::compute_outdent`]. Returns true if the
    /// line was rewritten.
    pub fn auto_outdent<D: DocumentMut + ?Sized>(&self, doc: &mut D, row: usize) -> bool {
        let Some(indent) = self.compute_outdent(&*doc, row) else {
            return false;
        };
        let Some(column) = closer_column(doc.line(row)) else {
            return false;
        };
        if doc.line(row)[..column - 1] == indent {
            return false;
        }
        log::trace!("outdenting row {row} to {} columns", indent.len());
        doc.replace(Range::new(row, 0, row, column - 1), &indent);
        true
    }
}

/// Byte column just after a leading `}`.
fn closer_column(line: &str) -> Option<usize> {
    let indent = line.len() - line.trim_start().len();
    line[indent..].starts_with('}').then_some(indent + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextDocument;

    #[test]
    fn test_trigger_condition() {
        let outdent = MatchingBraceOutdent::new();
        assert!(outdent.should_outdent("    ", "}"));
        assert!(outdent.should_outdent("\t", "  } else {"));
        assert!(!outdent.should_outdent("", "}"));
        assert!(!outdent.should_outdent("  x", "}"));
        assert!(!outdent.should_outdent("  ", "x }"));
    }

    #[test]
    fn test_closer_takes_the_opener_indentation() {
        let mut doc = TextDocument::new("    if (x) {\n        y();\n  }");
        let outdent = MatchingBraceOutdent::new();
        assert_eq!(outdent.compute_outdent(&doc, 2).as_deref(), Some("    "));
        assert!(outdent.auto_outdent(&mut doc, 2));
        assert_eq!(doc.line(2), "    }");
        assert!(!outdent.auto_outdent(&mut doc, 2));
    }

    #[test]
    fn test_no_edit_without_a_partner() {
        let mut doc = TextDocument::new("x\n  }");
        let outdent = MatchingBraceOutdent::new();
        assert_eq!(outdent.compute_outdent(&doc, 1), None);
        assert!(!outdent.auto_outdent(&mut doc, 1));
        assert_eq!(doc.value(), "x\n  }");
    }

    #[test]
    fn test_no_edit_when_opener_is_on_the_same_row() {
        let doc = TextDocument::new("  {}");
        assert_eq!(MatchingBraceOutdent::new().compute_outdent(&doc, 0), None);
        let doc = TextDocument::new("a {\n  b");
        assert_eq!(MatchingBraceOutdent::new().compute_outdent(&doc, 1), None);
    }
}
