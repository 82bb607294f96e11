//! Merge stage: per-document decks → one master deck.
//!
//! Constituent decks are concatenated in ascending modification-time order,
//! so the master deck reads in the order the documents were processed.
//! Files that are themselves master decks for the same target name are
//! excluded — merging `_MASTERDECK_2.csv` into `_MASTERDECK_3.csv` would
//! double every card on the second run. Output always goes to a fresh
//! probed path; an existing deck is never overwritten.

use crate::errlog::{ErrorLog, ErrorLogEntry};
use crate::error::PipelineError;
use crate::pipeline::queue::{list_files, unique_path};
use std::path::Path;
use tracing::{info, warn};

const STAGE: &str = "merge";

/// Whether `name` is a pre-existing master deck for `base_name`.
///
/// Matches `base.csv` and `base_<digits>.csv`, nothing else: `base_old.csv`
/// is a legitimately named per-document deck and must still be merged.
pub fn is_excluded_master(name: &str, base_name: &str) -> bool {
    if !name.to_lowercase().ends_with(".csv") {
        return false;
    }

    let stem = &name[..name.len() - 4];
    if stem == base_name {
        return true;
    }

    match stem.strip_prefix(base_name).and_then(|s| s.strip_prefix('_')) {
        Some(suffix) => !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Merge the per-document decks in `csv_dir` into one master deck.
///
/// Returns the file name of the written deck, or `None` when there was
/// nothing to merge or the merge itself failed (failure is logged, not
/// fatal — the per-document decks are still on disk and intact).
pub fn run(csv_dir: &Path, output_name: &str, log: &ErrorLog) -> Result<Option<String>, PipelineError> {
    let output_file_name = if output_name.to_lowercase().ends_with(".csv") {
        output_name.to_string()
    } else {
        format!("{output_name}.csv")
    };
    let output_base = &output_file_name[..output_file_name.len() - 4];

    let mut sources: Vec<_> = list_files(csv_dir, "csv")
        .map_err(|e| PipelineError::StageIo {
            stage: STAGE,
            path: csv_dir.to_path_buf(),
            source: e,
        })?
        .into_iter()
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            !is_excluded_master(&name, output_base)
        })
        .collect();

    if sources.is_empty() {
        info!("No CSV files found; nothing to merge");
        return Ok(None);
    }

    // Ascending mtime: the master deck keeps processing order. A file with
    // an unreadable mtime sorts first rather than failing the merge.
    sources.sort_by_key(|path| {
        path.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let output_path = unique_path(csv_dir, &output_file_name);
    info!(
        "Merging {} file(s) into {}",
        sources.len(),
        output_path.display()
    );

    let mut merged = String::new();
    for source in &sources {
        let content = match std::fs::read_to_string(source) {
            Ok(content) => content,
            Err(e) => {
                warn!("Merge failed reading {}: {e}", source.display());
                log.append(
                    ErrorLogEntry::new(STAGE, format!("Failed to merge CSV files: {e}"))
                        .processed_file(&output_file_name),
                );
                return Ok(None);
            }
        };

        if !merged.is_empty() && !merged.ends_with('\n') && !content.is_empty() {
            merged.push('\n');
        }
        merged.push_str(&content);
    }

    if let Err(e) = std::fs::write(&output_path, merged) {
        warn!("Merge failed writing {}: {e}", output_path.display());
        log.append(
            ErrorLogEntry::new(STAGE, format!("Failed to merge CSV files: {e}"))
                .processed_file(&output_file_name),
        );
        return Ok(None);
    }

    let written = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or(output_file_name);
    info!("Merge complete: {written}");
    Ok(Some(written))
}
