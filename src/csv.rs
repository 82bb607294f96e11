//! Pipe-delimited CSV emission.
//!
//! Card content is prose and regularly contains commas, so the deck format
//! uses `|` as the field delimiter. Quoting is minimal: a field is wrapped
//! in double quotes only when it contains the delimiter, a quote character,
//! or a line break, with embedded quotes doubled. Rows end in `\n` and there
//! is no header row — Anki's importer treats a header as a card.

use crate::card::Card;
use std::borrow::Cow;

const DELIMITER: char = '|';

/// Serialise cards as pipe-delimited rows, one per card.
pub fn emit_rows(cards: &[Card]) -> String {
    let mut out = String::new();
    for card in cards {
        out.push_str(&escape_field(&card.main_content));
        out.push(DELIMITER);
        out.push_str(&escape_field(&card.extra_field));
        out.push(DELIMITER);
        out.push_str(&escape_field(&card.importance_value));
        out.push('\n');
    }
    out
}

/// Quote a field only when its content would otherwise break the row.
fn escape_field(field: &str) -> Cow<'_, str> {
    let needs_quoting = field
        .chars()
        .any(|c| c == DELIMITER || c == '"' || c == '\n' || c == '\r');

    if !needs_quoting {
        return Cow::Borrowed(field);
    }

    let mut quoted = String::with_capacity(field.len() + 2);
    quoted.push('"');
    for c in field.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(main: &str, extra: &str, importance: &str) -> Card {
        Card {
            main_content: main.into(),
            extra_field: extra.into(),
            importance_value: importance.into(),
        }
    }

    #[test]
    fn plain_fields_stay_unquoted() {
        let rows = emit_rows(&[card("What is ATP?", "Slide 3", "High Lecture1")]);
        assert_eq!(rows, "What is ATP?|Slide 3|High Lecture1\n");
    }

    #[test]
    fn commas_need_no_quoting() {
        let rows = emit_rows(&[card("a, b, and c", "x", "y")]);
        assert_eq!(rows, "a, b, and c|x|y\n");
    }

    #[test]
    fn delimiter_in_field_forces_quotes() {
        let rows = emit_rows(&[card("either|or", "x", "y")]);
        assert_eq!(rows, "\"either|or\"|x|y\n");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let rows = emit_rows(&[card("the \"sodium\" pump", "x", "y")]);
        assert_eq!(rows, "\"the \"\"sodium\"\" pump\"|x|y\n");
    }

    #[test]
    fn line_break_in_field_forces_quotes() {
        let rows = emit_rows(&[card("line one\nline two", "x", "y")]);
        assert_eq!(rows, "\"line one\nline two\"|x|y\n");
    }

    #[test]
    fn no_header_and_unix_endings() {
        let rows = emit_rows(&[card("a", "b", "c"), card("d", "e", "f")]);
        assert_eq!(rows, "a|b|c\nd|e|f\n");
        assert!(!rows.contains('\r'));
    }

    #[test]
    fn empty_batch_emits_nothing() {
        assert_eq!(emit_rows(&[]), "");
    }
}
