//! Convert stage: JSON intermediates → per-document CSV decks.
//!
//! The intermediates were validated on the way in, but this stage
//! re-validates from scratch: JSON files can be dropped into the queue
//! directory by hand, and a cheap second filter is what keeps a hand-edited
//! file from producing a broken deck.

use crate::card;
use crate::config::PipelineConfig;
use crate::csv;
use crate::errlog::{ErrorLog, ErrorLogEntry};
use crate::error::PipelineError;
use crate::pipeline::queue::{Stage, WorkQueue};
use crate::pipeline::StageCounts;
use crate::validate;
use tracing::{info, warn};

const STAGE: &str = "convert";

/// Convert every pending JSON intermediate to a CSV deck.
///
/// Returns the stage counts plus the total number of cards written.
pub fn run(
    config: &PipelineConfig,
    queue: &WorkQueue,
    log: &ErrorLog,
) -> Result<(StageCounts, usize), PipelineError> {
    let json_dir = config.layout.json();
    let csv_dir = config.layout.csv();

    let files = queue
        .pending(Stage::Extracted)
        .map_err(|e| PipelineError::StageIo {
            stage: STAGE,
            path: json_dir.clone(),
            source: e,
        })?;

    info!("Found {} JSON file(s) to convert", files.len());
    let mut counts = StageCounts::default();
    let mut cards_written = 0usize;

    for (index, json_path) in files.iter().enumerate() {
        let file_name = json_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("({}/{}) Converting {}", index + 1, files.len(), file_name);

        let payload = match card::read_intermediate(json_path) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping {file_name}: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, format!("Failed to read JSON: {e}"))
                        .processed_file(&file_name),
                );
                counts.skipped += 1;
                continue;
            }
        };

        let outcome = match validate::filter_batch(payload) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Skipping {file_name}: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, e.to_string()).processed_file(&file_name),
                );
                counts.skipped += 1;
                continue;
            }
        };

        if outcome.dropped > 0 {
            let missing: Vec<&str> = outcome.missing_fields.iter().map(String::as_str).collect();
            warn!(
                "{file_name}: dropped {} card(s) missing fields: {}",
                outcome.dropped,
                missing.join(", ")
            );
        }

        // Tags were injected during extraction; conversion only normalises.
        let cards = validate::cards_from_records(outcome.records);

        let stem = json_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let csv_path = csv_dir.join(format!("{stem}.csv"));

        match std::fs::write(&csv_path, csv::emit_rows(&cards)) {
            Ok(()) => {
                info!("Wrote {} card(s) to {}", cards.len(), csv_path.display());
                cards_written += cards.len();
                counts.processed += 1;
            }
            Err(e) => {
                warn!("Skipping {file_name}: failed to write CSV: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, format!("Failed to write CSV: {e}"))
                        .processed_file(&file_name),
                );
                counts.skipped += 1;
            }
        }
    }

    Ok((counts, cards_written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;

    fn test_config(root: &std::path::Path) -> PipelineConfig {
        let config = crate::PipelineConfig::builder(root, root.join("prompts"))
            .build()
            .unwrap();
        config.layout.ensure().unwrap();
        config
    }

    #[test]
    fn converts_intermediates_to_pipe_delimited_decks() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let queue = WorkQueue::new(config.layout.clone());
        let log = ErrorLog::new(&config.layout.error());

        let cards = vec![Card {
            main_content: "{{c1:ATP}} powers transport".into(),
            extra_field: "Slide 9".into(),
            importance_value: "High Bio_Lecture".into(),
        }];
        card::write_intermediate(&config.layout.json().join("bio.json"), &cards).unwrap();

        let (counts, written) = run(&config, &queue, &log).unwrap();
        assert_eq!(counts.processed, 1);
        assert_eq!(written, 1);

        let deck = std::fs::read_to_string(config.layout.csv().join("bio.csv")).unwrap();
        assert_eq!(deck, "{{c1::ATP}} powers transport|Slide 9|High Bio_Lecture\n");
    }

    #[test]
    fn malformed_intermediate_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let queue = WorkQueue::new(config.layout.clone());
        let log = ErrorLog::new(&config.layout.error());

        std::fs::write(config.layout.json().join("broken.json"), "{not json").unwrap();
        std::fs::write(
            config.layout.json().join("ok.json"),
            r#"[{"main_content": "q", "extra_field": "e", "importance_value": "t"}]"#,
        )
        .unwrap();

        let (counts, written) = run(&config, &queue, &log).unwrap();
        assert_eq!(counts.processed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(written, 1);
        assert!(config.layout.csv().join("ok.csv").is_file());
        assert!(!config.layout.csv().join("broken.csv").exists());

        let log_content = std::fs::read_to_string(log.path()).unwrap();
        assert!(log_content.contains("broken.json"));
    }
}
