//! Extraction backends: drive an external generation service and recover a
//! JSON card batch from its response.
//!
//! Two provider variants exist behind one `process` capability:
//!
//! * [`claude::ClaudeBackend`] — inline-attach-and-stream: the document is
//!   embedded in the request as base64 and the response is consumed as a
//!   server-sent-event stream. This variant owns chunking, since inline
//!   attachments have a hard size ceiling.
//! * [`gemini::GeminiBackend`] — upload-then-generate: the document is
//!   uploaded once, then referenced by URI in a separate generation call.
//!
//! The variants are a closed enum, not a trait object: there are exactly
//! two, the coordinator matches on nothing else, and the shared retry
//! skeleton composes around them instead of sitting in a base class.
//!
//! ## Retry strategy
//!
//! Rate-limit and transient-server failures are frequent and clear within
//! seconds. Each call gets a fixed-delay retry budget; classification into
//! transient vs. fatal happens provider-side ([`classify_http`],
//! [`classify_request_error`]) so the skeleton never inspects provider
//! error shapes. Parse failures are never retried — an identical request
//! cannot fix a structurally wrong response.

pub mod claude;
pub mod gemini;

use crate::config::{BackendKind, PipelineConfig};
use crate::error::{BackendFailure, DocumentError, PipelineError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// The configured extraction backend.
pub enum Backend {
    Claude(claude::ClaudeBackend),
    Gemini(gemini::GeminiBackend),
}

impl Backend {
    /// Build the backend selected by `config`, reading credentials from the
    /// environment. A missing key is a stage-level config failure.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let retry = RetryPolicy {
            max_attempts: config.max_retries,
            delay: Duration::from_secs(config.retry_delay_secs),
        };

        match config.backend {
            BackendKind::Claude => {
                let api_key = env_key("CLAUDE_API_KEY")
                    .or_else(|| env_key("ANTHROPIC_API_KEY"))
                    .ok_or_else(|| PipelineError::MissingApiKey {
                        backend: "claude".into(),
                        var: "CLAUDE_API_KEY".into(),
                    })?;
                let model = config
                    .claude_model
                    .clone()
                    .or_else(|| env_key("CLAUDE_MODEL"))
                    .unwrap_or_else(|| claude::DEFAULT_MODEL.to_string());
                Ok(Backend::Claude(claude::ClaudeBackend::new(
                    api_key,
                    model,
                    retry,
                    config.chunk_min_pages,
                    config.chunk_max_pages,
                )))
            }
            BackendKind::Gemini => {
                let api_key =
                    env_key("GEMINI_API_KEY").ok_or_else(|| PipelineError::MissingApiKey {
                        backend: "gemini".into(),
                        var: "GEMINI_API_KEY".into(),
                    })?;
                let model = config
                    .gemini_model
                    .clone()
                    .or_else(|| env_key("GEMINI_MODEL"))
                    .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string());
                Ok(Backend::Gemini(gemini::GeminiBackend::new(api_key, model, retry)))
            }
        }
    }

    /// Extract a raw card batch from the document at `pdf_path`.
    ///
    /// Returns the decoded JSON payload; schema enforcement is the
    /// validator's job, not the backend's.
    pub async fn process(&self, pdf_path: &Path, prompt: &str) -> Result<Value, DocumentError> {
        match self {
            Backend::Claude(b) => b.process(pdf_path, prompt).await,
            Backend::Gemini(b) => b.process(pdf_path, prompt).await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Claude(_) => "claude",
            Backend::Gemini(_) => "gemini",
        }
    }
}

fn env_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

// ── Retry skeleton ───────────────────────────────────────────────────────

/// Fixed-delay retry budget shared by both variants.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Run `call` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between attempts. Only transient failures are retried; everything else
/// returns immediately.
pub(crate) async fn call_with_retry<F, Fut>(
    policy: RetryPolicy,
    provider: &'static str,
    mut call: F,
) -> Result<Value, BackendFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, BackendFailure>>,
{
    let mut last: Option<BackendFailure> = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        match call().await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "[{provider}] transient failure (attempt {attempt}/{}): {failure}; retrying in {:?}",
                    policy.max_attempts, policy.delay
                );
                last = Some(failure);
                sleep(policy.delay).await;
            }
            Err(failure) => return Err(failure),
        }
    }

    Err(last.unwrap_or(BackendFailure::Transport {
        provider,
        detail: "retry budget exhausted".into(),
        transient: true,
    }))
}

// ── Failure classification ───────────────────────────────────────────────

/// Map an HTTP error status onto the shared taxonomy.
///
/// 429 and 5xx (including Anthropic's 529 "overloaded") are transient;
/// everything else — bad request, auth, not found — is fatal.
pub(crate) fn classify_http(provider: &'static str, status: u16, body: &str) -> BackendFailure {
    let transient = matches!(status, 429 | 500 | 502 | 503 | 504 | 529);
    let snippet: String = body.chars().take(300).collect();
    BackendFailure::Transport {
        provider,
        detail: format!("HTTP {status}: {snippet}"),
        transient,
    }
}

/// Map a reqwest transport error onto the shared taxonomy.
pub(crate) fn classify_request_error(provider: &'static str, e: &reqwest::Error) -> BackendFailure {
    BackendFailure::Transport {
        provider,
        detail: e.to_string(),
        transient: e.is_timeout() || e.is_connect(),
    }
}

// ── Response text post-processing ────────────────────────────────────────

static RE_CODE_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").unwrap());

/// Strip a markdown code fence if the response wrapped its payload in one.
pub(crate) fn strip_code_fences(text: &str) -> &str {
    if !text.contains("```") {
        return text;
    }
    match RE_CODE_FENCES.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text,
    }
}

/// Locate and decode a JSON payload inside a noisy response.
///
/// After fence stripping, scan for each `[` or `{` and attempt a strict
/// decode of one complete JSON value from that offset; the first offset
/// that decodes wins. Trailing prose after the value is fine.
pub fn extract_json_payload(text: &str) -> Option<Value> {
    let cleaned = strip_code_fences(text).trim().trim_start_matches('\u{feff}');

    for (index, ch) in cleaned.char_indices() {
        if ch != '[' && ch != '{' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&cleaned[index..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            return Some(value);
        }
    }

    None
}

/// Decode a payload or produce a parse failure carrying the full response.
pub(crate) fn decode_payload(provider: &'static str, raw: &str) -> Result<Value, BackendFailure> {
    extract_json_payload(raw).ok_or_else(|| BackendFailure::Parse {
        provider,
        raw: raw.to_string(),
    })
}
