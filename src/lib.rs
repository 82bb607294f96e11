//! # pdf2anki
//!
//! Convert lecture slide PDFs into Anki flashcard decks using LLMs.
//!
//! ## Why this crate?
//!
//! Making good flashcards from a slide deck is mechanical work a language
//! model does well — but a raw model response is not a deck. This crate
//! wraps the model call in everything the batch workflow actually needs:
//! a directory-driven queue that survives restarts, retry and failure
//! isolation so one bad deck never kills an overnight run, schema
//! validation and cloze-marker repair of the model output, and a
//! collision-safe merge into a master deck.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw_slides/*.pdf
//!  │
//!  ├─ 1. Sanitize  normalise filenames, compress oversized decks (gs)
//!  ├─ 2. Extract   claude (inline+stream) / gemini (upload+generate)
//!  │               └─ oversized decks split into balanced page segments
//!  ├─ 3. Validate  schema filter, cloze repair, tag injection → json/
//!  ├─ 4. Convert   pipe-delimited CSV, minimal quoting → csv/
//!  └─ 5. Merge     newline-safe concat into _MASTERDECK_N.csv (optional)
//! ```
//!
//! Processing is deliberately sequential: the extraction services are
//! rate-limited, and one-document-at-a-time keeps every directory mutation
//! single-writer with no locking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2anki::{pipeline, BackendKind, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // GEMINI_API_KEY read from the environment
//!     let config = PipelineConfig::builder("./data", "./prompts")
//!         .backend(BackendKind::Gemini)
//!         .prompt_name("QAClozeSourceYield")
//!         .merge_output(Some("_MASTERDECK".to_string()))
//!         .build()?;
//!     let summary = pipeline::run(&config).await?;
//!     println!("{} cards written", summary.cards_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2anki` binary (clap + anyhow + tracing-subscriber + dotenvy) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod card;
pub mod compress;
pub mod config;
pub mod csv;
pub mod errlog;
pub mod error;
pub mod pages;
pub mod pipeline;
pub mod prompts;
pub mod segment;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use card::{Card, RunSummary};
pub use config::{BackendKind, DirLayout, PipelineConfig, PipelineConfigBuilder};
pub use error::{BackendFailure, DocumentError, PipelineError};
pub use pipeline::{run, run_with_cancel, CancelFlag};
pub use segment::{plan_segments, Segment};
