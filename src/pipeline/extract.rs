//! Extract stage: slides → JSON intermediates.
//!
//! One backend call per document, strictly sequential — the extraction
//! services are rate-limited, and serialising the calls keeps directory
//! mutations single-writer by construction. A failing document is logged
//! and skipped; the batch never dies for one bad deck.

use crate::backend::Backend;
use crate::card;
use crate::config::PipelineConfig;
use crate::errlog::{ErrorLog, ErrorLogEntry};
use crate::error::{DocumentError, PipelineError};
use crate::pipeline::queue::{Stage, WorkQueue};
use crate::pipeline::{CancelFlag, StageCounts};
use crate::validate;
use tracing::{info, warn};

const STAGE: &str = "extract";

/// Run every pending slide deck through the extraction backend.
pub async fn run(
    config: &PipelineConfig,
    queue: &WorkQueue,
    log: &ErrorLog,
    backend: &Backend,
    prompt_text: &str,
    cancel: &CancelFlag,
) -> Result<StageCounts, PipelineError> {
    let slides_dir = config.layout.slides();
    let json_dir = config.layout.json();

    let files = queue
        .pending(Stage::Sanitized)
        .map_err(|e| PipelineError::StageIo {
            stage: STAGE,
            path: slides_dir.clone(),
            source: e,
        })?;

    info!(
        "Found {} PDF file(s) to process with the {} backend",
        files.len(),
        backend.name()
    );
    let mut counts = StageCounts::default();

    for (index, pdf_path) in files.iter().enumerate() {
        if cancel.is_requested() {
            return Err(PipelineError::Interrupted);
        }

        let file_name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("({}/{}) Processing {}", index + 1, files.len(), file_name);

        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let document_tag = validate::sanitize_tag(&stem);
        let tag = if config.tag_prefix.is_empty() {
            document_tag
        } else {
            format!("{}{}", config.tag_prefix, document_tag)
        };

        let payload = match backend.process(pdf_path, prompt_text).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping {file_name}: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, e.to_string())
                        .processed_file(&file_name)
                        .uploaded_file(&file_name)
                        .prompt_file(&config.prompt_name)
                        .ai_response(e.raw_response()),
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
                    ErrorLogEntry::new(STAGE, e.to_string())
                        .processed_file(&file_name)
                        .prompt_file(&config.prompt_name),
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
            log.append(
                ErrorLogEntry::new(
                    STAGE,
                    format!(
                        "Dropped {} card(s) missing fields: {}",
                        outcome.dropped,
                        missing.join(", ")
                    ),
                )
                .processed_file(&file_name)
                .prompt_file(&config.prompt_name),
            );
        }

        let cards = validate::finalize_cards(outcome.records, &tag);
        info!("Generated {} card(s)", cards.len());

        let json_path = json_dir.join(format!("{stem}.json"));
        match card::write_intermediate(&json_path, &cards) {
            Ok(()) => {
                info!("Wrote {}", json_path.display());
                counts.processed += 1;
            }
            Err(DocumentError::Io { path, source }) => {
                warn!("Skipping {file_name}: failed to write JSON: {source}");
                log.append(
                    ErrorLogEntry::new(
                        STAGE,
                        format!("Failed to write JSON output '{}': {source}", path.display()),
                    )
                    .processed_file(&file_name)
                    .prompt_file(&config.prompt_name),
                );
                counts.skipped += 1;
            }
            Err(e) => {
                warn!("Skipping {file_name}: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, e.to_string()).processed_file(&file_name),
                );
                counts.skipped += 1;
            }
        }
    }

    Ok(counts)
}
