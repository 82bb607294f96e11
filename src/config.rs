//! Configuration types for a pipeline run.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to construct test fixtures over a temp directory and to diff two
//! runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which extraction backend drives the slides → JSON stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Inline-attach-and-stream variant (Anthropic Messages API).
    Claude,
    /// Upload-then-generate variant (Gemini Files API). (default)
    #[default]
    Gemini,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Claude => "claude",
            BackendKind::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The directory-as-queue layout under one data root.
///
/// Every lifecycle transition of a document is a move between these
/// directories; the Stage Coordinator is their only writer.
#[derive(Debug, Clone)]
pub struct DirLayout {
    root: PathBuf,
}

impl DirLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw intake directory: unsanitised uploads land here.
    pub fn raw(&self) -> PathBuf {
        self.root.join("raw_slides")
    }

    pub fn raw_done(&self) -> PathBuf {
        self.raw().join("DONE")
    }

    /// Sanitised slides awaiting extraction.
    pub fn slides(&self) -> PathBuf {
        self.root.join("slides")
    }

    pub fn slides_done(&self) -> PathBuf {
        self.slides().join("DONE")
    }

    /// JSON intermediates awaiting CSV conversion.
    pub fn json(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn json_done(&self) -> PathBuf {
        self.json().join("DONE")
    }

    /// Per-document CSV decks (and the merged master deck).
    pub fn csv(&self) -> PathBuf {
        self.root.join("csv")
    }

    pub fn csv_done(&self) -> PathBuf {
        self.csv().join("DONE")
    }

    /// Failed documents and the append-only error log.
    pub fn error(&self) -> PathBuf {
        self.root.join("error")
    }

    /// Create the full directory tree. Idempotent.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            self.raw(),
            self.raw_done(),
            self.slides(),
            self.slides_done(),
            self.json(),
            self.json_done(),
            self.csv(),
            self.csv_done(),
            self.error(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`].
///
/// # Example
/// ```rust
/// use pdf2anki::{BackendKind, PipelineConfig};
///
/// let config = PipelineConfig::builder("./data", "./prompts")
///     .backend(BackendKind::Claude)
///     .prompt_name("QAClozeSourceYield")
///     .merge_output(Some("_MASTERDECK".to_string()))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory tree the pipeline owns.
    pub layout: DirLayout,

    /// Directory holding prompt `.txt` files.
    pub prompts_dir: PathBuf,

    /// Logical prompt name, with or without `.txt`. Default: "QAClozeSourceYield".
    pub prompt_name: String,

    /// Extraction backend. Default: [`BackendKind::Gemini`].
    pub backend: BackendKind,

    /// Prefix prepended to the per-document filename tag.
    pub tag_prefix: String,

    /// Merge per-document CSVs into a master deck with this base name.
    /// `None` skips the merge stage entirely.
    pub merge_output: Option<String>,

    /// Skip the sanitize stage and leave slides where they are afterwards.
    pub skip_sanitize: bool,

    /// Delete intermediate JSON and non-kept CSV files after the run. Default: true.
    pub cleanup: bool,

    /// Attempts per backend call on a transient failure. Default: 3.
    ///
    /// This is a total-attempt count, not an extra-retry count: 3 means at
    /// most two sleeps. Rate limits on the extraction services clear within
    /// seconds, so a small fixed budget catches the common case without
    /// stalling the whole sequential batch.
    pub max_retries: u32,

    /// Fixed delay between attempts, in seconds. Default: 5.
    pub retry_delay_secs: u64,

    /// Inputs larger than this run through the external compressor. Default: 50 MB.
    pub compression_threshold_bytes: u64,

    /// Documents below this page count are never segmented. Default: 25.
    pub chunk_min_pages: usize,

    /// Hard per-segment page cap for the inline-attach backend. Default: 40.
    ///
    /// 40 pages of slides stays comfortably inside the request-size and
    /// output-token limits of both services.
    pub chunk_max_pages: usize,

    /// Model override for the Claude backend. `CLAUDE_MODEL` env wins over
    /// the built-in default when this is `None`.
    pub claude_model: Option<String>,

    /// Model override for the Gemini backend. `GEMINI_MODEL` env wins over
    /// the built-in default when this is `None`.
    pub gemini_model: Option<String>,
}

impl PipelineConfig {
    /// Create a builder rooted at the given data and prompts directories.
    pub fn builder(data_dir: impl Into<PathBuf>, prompts_dir: impl Into<PathBuf>) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: PipelineConfig {
                layout: DirLayout::new(data_dir),
                prompts_dir: prompts_dir.into(),
                prompt_name: "QAClozeSourceYield".to_string(),
                backend: BackendKind::default(),
                tag_prefix: String::new(),
                merge_output: None,
                skip_sanitize: false,
                cleanup: true,
                max_retries: 3,
                retry_delay_secs: 5,
                compression_threshold_bytes: 50 * 1024 * 1024,
                chunk_min_pages: 25,
                chunk_max_pages: 40,
                claude_model: None,
                gemini_model: None,
            },
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn prompt_name(mut self, name: impl Into<String>) -> Self {
        self.config.prompt_name = name.into();
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.tag_prefix = prefix.into();
        self
    }

    pub fn merge_output(mut self, name: Option<String>) -> Self {
        self.config.merge_output = name;
        self
    }

    pub fn skip_sanitize(mut self, v: bool) -> Self {
        self.config.skip_sanitize = v;
        self
    }

    pub fn cleanup(mut self, v: bool) -> Self {
        self.config.cleanup = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn retry_delay_secs(mut self, secs: u64) -> Self {
        self.config.retry_delay_secs = secs;
        self
    }

    pub fn compression_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.compression_threshold_bytes = bytes;
        self
    }

    pub fn chunk_min_pages(mut self, n: usize) -> Self {
        self.config.chunk_min_pages = n.max(1);
        self
    }

    pub fn chunk_max_pages(mut self, n: usize) -> Self {
        self.config.chunk_max_pages = n.max(1);
        self
    }

    pub fn claude_model(mut self, model: impl Into<String>) -> Self {
        self.config.claude_model = Some(model.into());
        self
    }

    pub fn gemini_model(mut self, model: impl Into<String>) -> Self {
        self.config.gemini_model = Some(model.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.chunk_min_pages > c.chunk_max_pages {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk_min_pages ({}) must not exceed chunk_max_pages ({})",
                c.chunk_min_pages, c.chunk_max_pages
            )));
        }
        if c.prompt_name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "prompt_name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = PipelineConfig::builder("/tmp/data", "/tmp/prompts")
            .build()
            .unwrap();
        assert_eq!(config.backend, BackendKind::Gemini);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_secs, 5);
        assert_eq!(config.chunk_min_pages, 25);
        assert_eq!(config.chunk_max_pages, 40);
        assert!(config.cleanup);
        assert!(config.merge_output.is_none());
    }

    #[test]
    fn builder_rejects_inverted_chunk_bounds() {
        let err = PipelineConfig::builder("/tmp/data", "/tmp/prompts")
            .chunk_min_pages(50)
            .chunk_max_pages(40)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn layout_paths_nest_under_root() {
        let layout = DirLayout::new("/data");
        assert_eq!(layout.slides(), PathBuf::from("/data/slides"));
        assert_eq!(layout.slides_done(), PathBuf::from("/data/slides/DONE"));
        assert_eq!(layout.error(), PathBuf::from("/data/error"));
    }
}
