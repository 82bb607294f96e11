//! The stage coordinator.
//!
//! Drives each document through sanitize → extract → convert → merge and
//! owns every directory mutation. Stages never move files themselves; they
//! report outcomes and the coordinator (through [`queue::WorkQueue`])
//! performs the moves, so the lifecycle of a document has exactly one
//! writer.
//!
//! ## Failure scopes
//!
//! * A stage-level problem (missing prompt, missing API key, unreadable
//!   directory) aborts the run before any document in that stage is
//!   touched.
//! * A per-document problem is logged, the document is skipped, and the
//!   run continues.
//! * A housekeeping problem (a move or delete after the real work) is a
//!   warning and nothing more.
//!
//! ## Data flow
//!
//! ```text
//! raw_slides/ ──▶ slides/ ──▶ json/ ──▶ csv/ ──▶ csv/DONE/
//!   (sanitize)   (extract)  (convert)  (merge)
//! ```

pub mod convert;
pub mod extract;
pub mod merge;
pub mod queue;
pub mod sanitize;

use crate::backend::Backend;
use crate::card::RunSummary;
use crate::config::PipelineConfig;
use crate::errlog::ErrorLog;
use crate::error::PipelineError;
use crate::prompts;
use queue::{Stage, WorkQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-stage outcome tally.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageCounts {
    pub processed: usize,
    pub skipped: usize,
}

/// Cooperative cancellation flag.
///
/// Set from a signal handler (or anywhere else); the coordinator checks it
/// between documents and between stages, never mid-call, so an in-flight
/// document always reaches a consistent state before the run stops.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run the full pipeline with the given configuration.
pub async fn run(config: &PipelineConfig) -> Result<RunSummary, PipelineError> {
    run_with_cancel(config, &CancelFlag::new()).await
}

/// Run the full pipeline, honouring `cancel` at between-document and
/// between-stage boundaries.
pub async fn run_with_cancel(
    config: &PipelineConfig,
    cancel: &CancelFlag,
) -> Result<RunSummary, PipelineError> {
    config.layout.ensure().map_err(|e| PipelineError::StageIo {
        stage: "startup",
        path: config.layout.root().to_path_buf(),
        source: e,
    })?;

    let log = ErrorLog::new(&config.layout.error());
    let work_queue = WorkQueue::new(config.layout.clone());
    let mut summary = RunSummary::default();

    info!("Pipeline starting (backend: {})", config.backend);

    // ── Stage 1: sanitize ────────────────────────────────────────────────
    if config.skip_sanitize {
        info!("Step 1/4: skipping sanitization");
    } else {
        info!("Step 1/4: sanitizing raw slides");
        let counts = sanitize::run(config, &work_queue, &log).await?;
        summary.sanitized = counts.processed;
        summary.skipped += counts.skipped;
    }

    ensure_not_cancelled(cancel)?;

    // ── Stage 2: extract ─────────────────────────────────────────────────
    // Prompt and credentials resolve before any document is touched, so a
    // config problem aborts with an untouched queue.
    info!("Step 2/4: converting PDFs to JSON");
    let prompt_text = prompts::load(&config.prompts_dir, &config.prompt_name)?;
    let backend = Backend::from_config(config)?;
    let counts = extract::run(config, &work_queue, &log, &backend, &prompt_text, cancel).await?;
    summary.extracted = counts.processed;
    summary.skipped += counts.skipped;

    ensure_not_cancelled(cancel)?;

    // ── Stage 3: convert ─────────────────────────────────────────────────
    info!("Step 3/4: converting JSON to CSV");
    let (counts, cards_written) = convert::run(config, &work_queue, &log)?;
    summary.converted = counts.processed;
    summary.skipped += counts.skipped;
    summary.cards_written = cards_written;

    ensure_not_cancelled(cancel)?;

    // ── Stage 4: merge (optional) ────────────────────────────────────────
    if let Some(ref merge_output) = config.merge_output {
        info!("Step 4/4: merging CSV files");
        summary.merged_deck = merge::run(&config.layout.csv(), merge_output, &log)?;
    } else {
        info!("Step 4/4: skipping CSV merge (not requested)");
    }

    // ── Housekeeping ─────────────────────────────────────────────────────
    housekeep(config, &work_queue, &summary);

    info!(
        "Pipeline complete: {} sanitized, {} extracted, {} converted, {} cards, {} skipped",
        summary.sanitized,
        summary.extracted,
        summary.converted,
        summary.cards_written,
        summary.skipped
    );

    Ok(summary)
}

fn ensure_not_cancelled(cancel: &CancelFlag) -> Result<(), PipelineError> {
    if cancel.is_requested() {
        Err(PipelineError::Interrupted)
    } else {
        Ok(())
    }
}

/// Terminal moves and cleanup. Nothing in here is allowed to fail the run;
/// every problem degrades to a warning.
fn housekeep(config: &PipelineConfig, work_queue: &WorkQueue, summary: &RunSummary) {
    // Processed slides move out of the queue so the next run starts clean.
    if !config.skip_sanitize {
        info!("Moving processed slides to DONE");
        retire_all(work_queue, Stage::Sanitized);
    }

    if let Some(ref merged) = summary.merged_deck {
        let merged_path = config.layout.csv().join(merged);
        match work_queue.retire(&merged_path, Stage::Converted) {
            Ok(target) => info!("Moved merged deck to {}", target.display()),
            Err(e) => warn!("Could not move merged deck {merged}: {e}"),
        }

        // Individual decks are only disposable once their content lives in
        // the master deck.
        if config.cleanup {
            info!("Cleaning up individual CSV files");
            delete_all(work_queue, Stage::Converted);
        }
    }

    if config.skip_sanitize {
        // Slides were not retired, so a later run would re-extract them and
        // overwrite these intermediates; preserve them in DONE instead of
        // leaving them to be clobbered.
        info!("Preserving JSON intermediates in DONE");
        retire_all(work_queue, Stage::Extracted);
    } else if config.cleanup {
        info!("Cleaning up intermediate JSON files");
        delete_all(work_queue, Stage::Extracted);
    }
}

fn retire_all(work_queue: &WorkQueue, stage: Stage) {
    let files = match work_queue.pending(stage) {
        Ok(files) => files,
        Err(e) => {
            warn!("Could not list files for housekeeping: {e}");
            return;
        }
    };
    for file in files {
        if let Err(e) = work_queue.retire(&file, stage) {
            warn!("Could not move {} to DONE: {e}", file.display());
        }
    }
}

fn delete_all(work_queue: &WorkQueue, stage: Stage) {
    let files = match work_queue.pending(stage) {
        Ok(files) => files,
        Err(e) => {
            warn!("Could not list files for cleanup: {e}");
            return;
        }
    };
    for file in files {
        if let Err(e) = std::fs::remove_file(&file) {
            warn!("Could not delete {}: {e}", file.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_round_trip() {
        let flag = CancelFlag::new();
        assert!(!flag.is_requested());

        let shared = flag.clone();
        shared.request();
        assert!(flag.is_requested());
    }

    #[tokio::test]
    async fn missing_prompt_aborts_before_touching_documents() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder(dir.path().join("data"), dir.path().join("prompts"))
            .skip_sanitize(true)
            .build()
            .unwrap();
        config.layout.ensure().unwrap();

        let slide = config.layout.slides().join("deck.pdf");
        std::fs::write(&slide, b"%PDF-1.4").unwrap();

        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, PipelineError::PromptNotFound { .. }));
        // The queue is untouched.
        assert!(slide.is_file());
    }

    #[tokio::test]
    async fn cancellation_stops_at_stage_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder(dir.path().join("data"), dir.path().join("prompts"))
            .build()
            .unwrap();
        config.layout.ensure().unwrap();

        let cancel = CancelFlag::new();
        cancel.request();

        let err = run_with_cancel(&config, &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Interrupted));
    }
}
