//! Error types for the pdf2anki library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed at all (missing
//!   API key, missing prompt file, unreadable stage directory). Returned as
//!   `Err(PipelineError)` from [`crate::pipeline::run`] before any document
//!   in the failing stage has been touched.
//!
//! * [`DocumentError`] — **Non-fatal**: a single document failed (backend
//!   error, malformed response, write error) but the rest of the batch is
//!   fine. The coordinator logs it, skips the document, and continues.
//!
//! * [`BackendFailure`] — the extraction-backend taxonomy shared by both
//!   provider variants. A transport failure carries a transient flag that
//!   drives the retry skeleton; a parse failure is never retried because
//!   repeating the identical call cannot fix a structurally wrong response.
//!
//! The separation lets the coordinator decide tolerance per scope: abort on
//! config problems, skip-and-log per document, warn-only during housekeeping.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal, stage-level errors returned by the pdf2anki library.
///
/// Per-document failures use [`DocumentError`] and never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// No prompt file with the requested logical name exists.
    #[error("Prompt file not found: '{path}'\nRun with --list-prompts to see what is available.")]
    PromptNotFound { name: String, path: PathBuf },

    /// The API key environment variable for the selected backend is unset.
    #[error("{var} is not set.\nExport it (or add it to .env) before selecting the {backend} backend.")]
    MissingApiKey { backend: String, var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A stage directory could not be read or created.
    #[error("{stage} stage cannot access '{path}': {source}")]
    StageIo {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Cancellation ──────────────────────────────────────────────────────
    /// An external interrupt was observed at a between-document boundary.
    #[error("Pipeline interrupted")]
    Interrupted,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure scoped to one document.
///
/// The coordinator converts these into console messages plus error-log
/// entries; the run continues with the next document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The extraction backend gave up on this document.
    #[error(transparent)]
    Backend(#[from] BackendFailure),

    /// The decoded payload violates the record schema.
    #[error("Invalid card structure: {detail}")]
    Schema { detail: String },

    /// Reading or writing this document's files failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DocumentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocumentError::Io {
            path: path.into(),
            source,
        }
    }

    /// The complete backend response preserved for the error log, if any.
    pub fn raw_response(&self) -> &str {
        match self {
            DocumentError::Backend(f) => f.raw_response(),
            _ => "",
        }
    }
}

/// Extraction-backend failures, classified provider-side into a shared
/// taxonomy so retry policy stays provider-agnostic.
#[derive(Debug, Error)]
pub enum BackendFailure {
    /// Network, auth, or server failure talking to the generation service.
    ///
    /// `transient` is true for rate-limit and transient-server signals
    /// (HTTP 429/5xx, timeouts); only those are retried.
    #[error("{provider} transport failure: {detail}")]
    Transport {
        provider: &'static str,
        detail: String,
        transient: bool,
    },

    /// The response arrived but no offset of it decodes as JSON.
    ///
    /// `raw` keeps the complete response text for the error log.
    #[error("{provider} response contained no decodable JSON payload")]
    Parse { provider: &'static str, raw: String },
}

impl BackendFailure {
    /// Whether the retry skeleton should try this call again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendFailure::Transport {
                transient: true,
                ..
            }
        )
    }

    /// The complete response text, when this failure preserved one.
    pub fn raw_response(&self) -> &str {
        match self {
            BackendFailure::Parse { raw, .. } => raw,
            BackendFailure::Transport { .. } => "",
        }
    }
}
