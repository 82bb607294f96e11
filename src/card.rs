//! The flashcard record and run-level bookkeeping types.

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One flashcard as written to the JSON intermediate and emitted as a CSV row.
///
/// All three fields are present and non-empty-typed by the time a card
/// reaches the emitter; `importance_value` doubles as a space-separated tag
/// accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub main_content: String,
    pub extra_field: String,
    pub importance_value: String,
}

/// Write a card batch as the pretty-printed JSON intermediate.
pub fn write_intermediate(path: &Path, cards: &[Card]) -> Result<(), DocumentError> {
    let json = serde_json::to_string_pretty(cards)
        .map_err(|e| DocumentError::Schema {
            detail: format!("failed to serialise cards: {e}"),
        })?;
    std::fs::write(path, json).map_err(|e| DocumentError::io(path, e))
}

/// Read a JSON intermediate back as an untyped value.
///
/// Untyped on purpose: the convert stage re-validates the structure so it
/// stays correct when fed JSON produced outside this process.
pub fn read_intermediate(path: &Path) -> Result<serde_json::Value, DocumentError> {
    let text = std::fs::read_to_string(path).map_err(|e| DocumentError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| DocumentError::Schema {
        detail: format!("failed to parse intermediate JSON: {e}"),
    })
}

/// What a completed run did, printed as the closing summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Documents moved from raw intake into the slides directory.
    pub sanitized: usize,
    /// Documents successfully converted to a JSON intermediate.
    pub extracted: usize,
    /// JSON intermediates successfully converted to CSV.
    pub converted: usize,
    /// Documents skipped by any stage due to a per-document failure.
    pub skipped: usize,
    /// Total cards across all CSVs written this run.
    pub cards_written: usize,
    /// Filename of the merged master deck, when the merge stage ran.
    pub merged_deck: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intermediate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.json");
        let cards = vec![Card {
            main_content: "What is the {{c1::renal}} threshold?".into(),
            extra_field: "Lecture 4, slide 12".into(),
            importance_value: "High Lecture4".into(),
        }];

        write_intermediate(&path, &cards).unwrap();
        let value = read_intermediate(&path).unwrap();
        let parsed: Vec<Card> = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, cards);
    }

    #[test]
    fn read_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json at all").unwrap();
        assert!(matches!(
            read_intermediate(&path),
            Err(DocumentError::Schema { .. })
        ));
    }
}
