//! Sanitize stage: raw intake → slides.
//!
//! Raw uploads arrive with whatever names the lecturer's laptop produced —
//! accented characters, Turkish letters, spaces. Those break both the
//! space-separated tag accumulator and some upload APIs, so every file gets
//! a normalised ASCII-ish name on its way into `slides/`. Inputs over the
//! compression threshold are squeezed through Ghostscript first; a deck
//! that cannot be compressed goes to the error directory rather than being
//! sent oversized to an API that will reject it after a slow upload.

use crate::compress;
use crate::config::PipelineConfig;
use crate::errlog::{ErrorLog, ErrorLogEntry};
use crate::error::PipelineError;
use crate::pipeline::queue::{unique_path, Stage, WorkQueue};
use crate::pipeline::StageCounts;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const STAGE: &str = "sanitize";

/// Explicit Turkish mapping. Most of these decompose under NFKD anyway;
/// the dotless/dotted i pair does not, so the table stays complete rather
/// than relying on which letters happen to decompose.
const TURKISH_CHAR_MAP: [(char, char); 12] = [
    ('ç', 'c'),
    ('Ç', 'C'),
    ('ğ', 'g'),
    ('Ğ', 'G'),
    ('ı', 'i'),
    ('İ', 'I'),
    ('ö', 'o'),
    ('Ö', 'O'),
    ('ş', 's'),
    ('Ş', 'S'),
    ('ü', 'u'),
    ('Ü', 'U'),
];

/// Remove combining diacritics while preserving base characters.
fn strip_diacritics(text: &str) -> String {
    text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// NFKD normalisation, Turkish character mapping, and space cleanup.
pub fn sanitize_name(name: &str) -> String {
    strip_diacritics(name)
        .chars()
        .map(|c| {
            TURKISH_CHAR_MAP
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect::<String>()
        .replace(' ', "_")
}

/// Sanitize and move PDFs from the raw intake directory into `slides/`.
pub async fn run(
    config: &PipelineConfig,
    queue: &WorkQueue,
    log: &ErrorLog,
) -> Result<StageCounts, PipelineError> {
    let raw_dir = config.layout.raw();
    let slides_dir = config.layout.slides();

    let files = queue.pending(Stage::Raw).map_err(|e| PipelineError::StageIo {
        stage: STAGE,
        path: raw_dir.clone(),
        source: e,
    })?;

    info!("Found {} raw PDF file(s) to sanitize", files.len());
    let mut counts = StageCounts::default();

    for (index, original) in files.iter().enumerate() {
        let original_name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("({}/{}) Sanitizing {}", index + 1, files.len(), original_name);

        let stem = original
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sanitized_name = format!("{}.pdf", sanitize_name(&stem));
        let target = unique_path(&slides_dir, &sanitized_name);

        let file_size = match original.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Skipping {original_name}: unable to read file size: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, format!("Unable to read file size: {e}"))
                        .processed_file(&original_name),
                );
                counts.skipped += 1;
                continue;
            }
        };

        if file_size > config.compression_threshold_bytes {
            info!(
                "{original_name} is {:.1} MB; compressing before upload",
                file_size as f64 / (1024.0 * 1024.0)
            );

            let temp = match tempfile::Builder::new()
                .prefix("pdf2anki-compress-")
                .suffix(".pdf")
                .tempfile_in(&raw_dir)
            {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping {original_name}: could not create temp file: {e}");
                    log.append(
                        ErrorLogEntry::new(STAGE, format!("Could not create temp file: {e}"))
                            .processed_file(&original_name),
                    );
                    counts.skipped += 1;
                    continue;
                }
            };

            let outcome = compress::compress_pdf(original, temp.path()).await;

            if !outcome.success {
                // An uncompressible oversized deck cannot be processed;
                // park it in the error directory.
                match queue.park_error(original) {
                    Ok(parked) => {
                        warn!(
                            "Compression of {original_name} failed; moved to {}",
                            parked.display()
                        );
                        log.append(
                            ErrorLogEntry::new(
                                STAGE,
                                "Compression failed; file moved to error folder.",
                            )
                            .processed_file(&original_name)
                            .ai_response(&outcome.diagnostics),
                        );
                    }
                    Err(e) => {
                        warn!("Compression of {original_name} failed and move to error failed: {e}");
                        log.append(
                            ErrorLogEntry::new(
                                STAGE,
                                format!("Compression failed and move to error failed: {e}"),
                            )
                            .processed_file(&original_name)
                            .ai_response(&outcome.diagnostics),
                        );
                    }
                }
                counts.skipped += 1;
                continue;
            }

            if let Err(e) = temp.persist(&target) {
                warn!("Skipping {original_name}: compressed file could not be moved: {e}");
                log.append(
                    ErrorLogEntry::new(
                        STAGE,
                        format!("Compression succeeded but move to slides failed: {e}"),
                    )
                    .processed_file(&original_name),
                );
                counts.skipped += 1;
                continue;
            }

            if let Err(e) = std::fs::remove_file(original) {
                // The compressed copy is in place; losing the original
                // removal is a warning, not a skip.
                warn!("Compressed {original_name} but could not remove the original: {e}");
                log.append(
                    ErrorLogEntry::new(
                        STAGE,
                        format!("Compressed file moved, but could not remove original: {e}"),
                    )
                    .processed_file(&original_name),
                );
            }

            info!("Compressed and moved to {}", target.display());
            counts.processed += 1;
            continue;
        }

        match std::fs::rename(original, &target) {
            Ok(()) => {
                info!("Moved to {}", target.display());
                counts.processed += 1;
            }
            Err(e) => {
                warn!("Skipping {original_name}: move to slides failed: {e}");
                log.append(
                    ErrorLogEntry::new(STAGE, format!("Move to slides failed: {e}"))
                        .processed_file(&original_name),
                );
                counts.skipped += 1;
            }
        }
    }

    Ok(counts)
}
