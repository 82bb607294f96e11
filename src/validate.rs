//! Schema validation and normalisation of raw extraction output.
//!
//! The extraction services return a JSON array of card objects — usually.
//! This module turns that "usually" into a guarantee:
//!
//! 1. **Shape filter** — a non-array payload or a non-object element fails
//!    the whole batch; an element merely missing required fields is dropped
//!    individually so one bad card doesn't cost the document.
//! 2. **Cloze normalisation** — models regularly emit the malformed
//!    single-colon cloze marker `{{c1:answer}}`; every string in every
//!    surviving record is rewritten to the canonical `{{c1::answer}}` form.
//!    The rewrite is idempotent, so re-running a batch is safe.
//! 3. **Tag injection** — the per-document tag is appended to each record's
//!    `importance_value` accumulator.

use crate::card::Card;
use crate::error::DocumentError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Fields every card object must carry to survive filtering.
pub const REQUIRED_FIELDS: [&str; 3] = ["main_content", "extra_field", "importance_value"];

/// Result of filtering one decoded batch.
#[derive(Debug)]
pub struct FilterOutcome {
    /// Records that carry all required fields, in original order.
    pub records: Vec<Map<String, Value>>,
    /// How many elements were dropped for missing fields.
    pub dropped: usize,
    /// Union of the field names the dropped elements were missing.
    pub missing_fields: BTreeSet<String>,
}

/// Filter a decoded payload down to well-formed card objects.
///
/// Whole-batch failures (non-array payload, non-object element) return
/// `Err`; individually malformed elements are dropped and counted.
pub fn filter_batch(value: Value) -> Result<FilterOutcome, DocumentError> {
    let Value::Array(items) = value else {
        return Err(DocumentError::Schema {
            detail: "response JSON is not a list".into(),
        });
    };

    let mut outcome = FilterOutcome {
        records: Vec::with_capacity(items.len()),
        dropped: 0,
        missing_fields: BTreeSet::new(),
    };

    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(record) = item else {
            return Err(DocumentError::Schema {
                detail: format!("card #{} is not an object", index + 1),
            });
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !record.contains_key(*field))
            .collect();

        if missing.is_empty() {
            outcome.records.push(record);
        } else {
            outcome.dropped += 1;
            outcome
                .missing_fields
                .extend(missing.into_iter().map(String::from));
        }
    }

    Ok(outcome)
}

// ── Cloze normalisation ──────────────────────────────────────────────────

static RE_BAD_CLOZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{c(\d+):([^:])").unwrap());

/// Rewrite the malformed single-colon cloze marker `{{cN:text}}` to the
/// canonical `{{cN::text}}`. A no-op on already-canonical markers.
pub fn normalize_cloze_text(text: &str) -> String {
    RE_BAD_CLOZE.replace_all(text, "{{c${1}::${2}").into_owned()
}

/// Recursively normalise cloze markers in every string of a JSON tree.
pub fn normalize_cloze_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_cloze_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_cloze_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_cloze_value(v)))
                .collect(),
        ),
        other => other,
    }
}

// ── Tagging ──────────────────────────────────────────────────────────────

/// Tags are space-separated in the accumulator, so spaces inside one tag
/// become underscores.
pub fn sanitize_tag(value: &str) -> String {
    value.replace(' ', "_")
}

/// Append `tag` to a card's `importance_value` accumulator.
pub fn append_tag(card: &mut Card, tag: &str) {
    if card.importance_value.is_empty() {
        card.importance_value = tag.to_string();
    } else {
        card.importance_value = format!("{} {}", card.importance_value, tag);
    }
}

// ── Finalisation ─────────────────────────────────────────────────────────

/// Turn filtered records into cards: normalise cloze markers and coerce
/// field values to strings. No tagging — the convert stage re-validates
/// already-tagged intermediates through this same path.
pub fn cards_from_records(records: Vec<Map<String, Value>>) -> Vec<Card> {
    records
        .into_iter()
        .map(|record| {
            let normalized = match normalize_cloze_value(Value::Object(record)) {
                Value::Object(map) => map,
                _ => unreachable!("normalisation preserves the value shape"),
            };
            Card {
                main_content: field_to_string(normalized.get("main_content")),
                extra_field: field_to_string(normalized.get("extra_field")),
                importance_value: field_to_string(normalized.get("importance_value")),
            }
        })
        .collect()
}

/// [`cards_from_records`] plus the document tag appended to each card.
pub fn finalize_cards(records: Vec<Map<String, Value>>, tag: &str) -> Vec<Card> {
    let mut cards = cards_from_records(records);
    for card in &mut cards {
        append_tag(card, tag);
    }
    cards
}

/// Coerce a JSON field to the string the CSV row will carry.
///
/// Models occasionally emit numbers or null where a string belongs; those
/// become their textual form rather than failing the card.
fn field_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_list_payload_fails_whole_batch() {
        let err = filter_batch(json!({"main_content": "x"}));
        assert!(matches!(err, Err(DocumentError::Schema { .. })));
    }

    #[test]
    fn non_object_element_fails_whole_batch() {
        let err = filter_batch(json!([{"main_content": "a", "extra_field": "b", "importance_value": ""}, 42]));
        assert!(matches!(err, Err(DocumentError::Schema { .. })));
    }

    #[test]
    fn element_missing_field_is_dropped_individually() {
        let outcome = filter_batch(json!([
            {"main_content": "a", "extra_field": "b", "importance_value": "c"},
            {"main_content": "a", "importance_value": "c"}
        ]))
        .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.missing_fields.contains("extra_field"));
    }

    #[test]
    fn empty_list_is_a_valid_batch() {
        let outcome = filter_batch(json!([])).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.dropped, 0);
    }

    #[test]
    fn cloze_single_colon_is_rewritten() {
        assert_eq!(normalize_cloze_text("{{c1:Answer}}"), "{{c1::Answer}}");
        assert_eq!(
            normalize_cloze_text("Both {{c1:left}} and {{c2:right}}"),
            "Both {{c1::left}} and {{c2::right}}"
        );
        assert_eq!(normalize_cloze_text("{{c12:multi digit}}"), "{{c12::multi digit}}");
    }

    #[test]
    fn cloze_normalisation_is_idempotent() {
        let once = normalize_cloze_text("{{c1:Answer}}");
        assert_eq!(normalize_cloze_text(&once), once);

        let canonical = "{{c3::already fine}}";
        assert_eq!(normalize_cloze_text(canonical), canonical);
    }

    #[test]
    fn cloze_normalisation_recurses_into_nested_values() {
        let value = json!([{"main_content": "{{c1:deep}}", "notes": ["{{c2:also here}}"]}]);
        let normalized = normalize_cloze_value(value);
        assert_eq!(
            normalized,
            json!([{"main_content": "{{c1::deep}}", "notes": ["{{c2::also here}}"]}])
        );
    }

    #[test]
    fn tag_appends_with_separating_space() {
        let mut card = Card {
            main_content: "q".into(),
            extra_field: "e".into(),
            importance_value: "High".into(),
        };
        append_tag(&mut card, "Lecture1");
        assert_eq!(card.importance_value, "High Lecture1");
    }

    #[test]
    fn tag_replaces_empty_importance() {
        let mut card = Card {
            main_content: "q".into(),
            extra_field: "e".into(),
            importance_value: String::new(),
        };
        append_tag(&mut card, "Lecture1");
        assert_eq!(card.importance_value, "Lecture1");
    }

    #[test]
    fn sanitize_tag_replaces_spaces() {
        assert_eq!(sanitize_tag("Week 3 Renal"), "Week_3_Renal");
    }

    #[test]
    fn finalize_coerces_and_tags() {
        let outcome = filter_batch(json!([
            {"main_content": "{{c1:kidney}}", "extra_field": null, "importance_value": 2}
        ]))
        .unwrap();

        let cards = finalize_cards(outcome.records, "Renal_Lecture");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].main_content, "{{c1::kidney}}");
        assert_eq!(cards[0].extra_field, "");
        assert_eq!(cards[0].importance_value, "2 Renal_Lecture");
    }
}
