//! Inline-attach-and-stream backend (Anthropic Messages API).
//!
//! The document travels inside the request as a base64 `document` block and
//! the response is consumed incrementally as server-sent events. Card
//! batches for a long slide deck routinely exceed the non-streaming
//! response limits, so streaming is not optional here.
//!
//! Inline attachment also caps the document size a single request can
//! carry, which is why this variant owns chunking: a deck over the hard
//! page cap is split into balanced segments, each segment is extracted to a
//! temp PDF and processed independently, and the per-segment record lists
//! are concatenated in segment order. One failed segment costs its own
//! records, never its siblings'.

use crate::backend::{
    call_with_retry, classify_http, classify_request_error, decode_payload, RetryPolicy,
};
use crate::error::{BackendFailure, DocumentError};
use crate::pages;
use crate::segment::plan_segments;
use base64::Engine;
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

const PROVIDER: &str = "claude";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 64_000;

/// Inline-attach-and-stream extraction backend.
pub struct ClaudeBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
    chunk_min_pages: usize,
    chunk_max_pages: usize,
}

impl ClaudeBackend {
    pub fn new(
        api_key: String,
        model: String,
        retry: RetryPolicy,
        chunk_min_pages: usize,
        chunk_max_pages: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            // Streaming a full card batch for 40 pages of slides can take
            // several minutes; the read timeout must cover the whole stream.
            .timeout(Duration::from_secs(900))
            .build()
            .expect("reqwest client construction only fails on TLS misconfiguration");

        Self {
            client,
            api_key,
            model,
            retry,
            chunk_min_pages,
            chunk_max_pages,
        }
    }

    /// Extract a card batch, chunking the document when it exceeds the
    /// per-request page cap.
    pub async fn process(&self, pdf_path: &Path, prompt: &str) -> Result<Value, DocumentError> {
        let total_pages = pages::page_count(pdf_path).await?;

        if total_pages <= self.chunk_max_pages {
            let encoded = self.encode_document(pdf_path).await?;
            let encoded_ref: &str = &encoded;
            return call_with_retry(self.retry, PROVIDER, move || {
                self.request_once(encoded_ref, prompt)
            })
            .await
            .map_err(Into::into);
        }

        self.process_chunked(pdf_path, prompt, total_pages).await
    }

    async fn process_chunked(
        &self,
        pdf_path: &Path,
        prompt: &str,
        total_pages: usize,
    ) -> Result<Value, DocumentError> {
        let segments = plan_segments(total_pages, self.chunk_min_pages, self.chunk_max_pages);
        info!(
            "Document has {} pages; processing {} segments",
            total_pages,
            segments.len()
        );

        let mut combined: Vec<Value> = Vec::new();
        let mut succeeded = 0usize;
        let mut last_failure: Option<DocumentError> = None;

        for (index, segment) in segments.iter().enumerate() {
            let temp = match tempfile::Builder::new()
                .prefix("pdf2anki-segment-")
                .suffix(".pdf")
                .tempfile()
            {
                Ok(temp) => temp,
                Err(e) => {
                    warn!(
                        "Segment {}/{} ({segment}) has no temp file: {e}",
                        index + 1,
                        segments.len()
                    );
                    last_failure = Some(DocumentError::io(pdf_path, e));
                    continue;
                }
            };

            if let Err(e) = pages::extract_range(pdf_path, *segment, temp.path()).await {
                warn!("Segment {}/{} ({segment}) could not be extracted: {e}", index + 1, segments.len());
                last_failure = Some(e);
                continue;
            }

            let encoded = match self.encode_document(temp.path()).await {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!("Segment {}/{} ({segment}) could not be read: {e}", index + 1, segments.len());
                    last_failure = Some(e);
                    continue;
                }
            };

            let encoded_ref: &str = &encoded;
            let attempt = call_with_retry(self.retry, PROVIDER, move || {
                self.request_once(encoded_ref, prompt)
            })
            .await;

            match attempt {
                Ok(Value::Array(items)) => {
                    debug!(
                        "Segment {}/{} ({segment}) produced {} cards",
                        index + 1,
                        segments.len(),
                        items.len()
                    );
                    combined.extend(items);
                    succeeded += 1;
                }
                Ok(other) => {
                    warn!(
                        "Segment {}/{} ({segment}) returned a non-list payload; contributing no cards",
                        index + 1,
                        segments.len()
                    );
                    last_failure = Some(DocumentError::Schema {
                        detail: format!("segment payload is not a list: {other}"),
                    });
                }
                Err(failure) => {
                    warn!("Segment {}/{} ({segment}) failed: {failure}", index + 1, segments.len());
                    last_failure = Some(failure.into());
                }
            }
        }

        // Every segment failing means the document failed; surface the last
        // failure so the document is logged and skipped instead of writing
        // an empty intermediate.
        if succeeded == 0 {
            if let Some(failure) = last_failure {
                return Err(failure);
            }
        }

        Ok(Value::Array(combined))
    }

    async fn encode_document(&self, path: &Path) -> Result<String, DocumentError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DocumentError::io(path, e))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// One streaming request. The caller wraps this in the retry skeleton.
    async fn request_once(&self, encoded_pdf: &str, prompt: &str) -> Result<Value, BackendFailure> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "stream": true,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "document",
                        "source": {
                            "type": "base64",
                            "media_type": "application/pdf",
                            "data": encoded_pdf,
                        },
                    },
                    {"type": "text", "text": prompt},
                ],
            }],
        });

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http(PROVIDER, status.as_u16(), &body_text));
        }

        let raw = collect_stream_text(response).await?;
        decode_payload(PROVIDER, &raw)
    }
}

/// Accumulate the text deltas of a streamed Messages response.
async fn collect_stream_text(response: reqwest::Response) -> Result<String, BackendFailure> {
    let start = Instant::now();
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut text = String::new();
    let mut chunk_count = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify_request_error(PROVIDER, &e))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Drain complete SSE lines; a partial line stays buffered until the
        // next chunk completes it.
        while let Some(newline) = buffer.find('\n') {
            let line = buffer[..newline].trim().to_string();
            buffer.drain(..=newline);
            if let Some(delta) = handle_sse_line(&line)? {
                text.push_str(&delta);
                chunk_count += 1;
            }
        }
    }

    debug!(
        "Received {} stream chunks in {:.1}s",
        chunk_count,
        start.elapsed().as_secs_f64()
    );

    Ok(text)
}

/// Extract the text delta from one SSE line, if it carries one.
fn handle_sse_line(line: &str) -> Result<Option<String>, BackendFailure> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let Ok(event) = serde_json::from_str::<Value>(payload.trim()) else {
        return Ok(None);
    };

    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => Ok(event
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(String::from)),
        Some("error") => {
            let error_type = event
                .pointer("/error/type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let message = event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("stream error");
            Err(BackendFailure::Transport {
                provider: PROVIDER,
                detail: format!("{error_type}: {message}"),
                transient: matches!(error_type, "overloaded_error" | "api_error" | "rate_limit_error"),
            })
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_text_delta_is_extracted() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"[{\"a\""}}"#;
        assert_eq!(handle_sse_line(line).unwrap(), Some("[{\"a\"".to_string()));
    }

    #[test]
    fn sse_non_delta_events_are_ignored() {
        assert_eq!(handle_sse_line("event: message_start").unwrap(), None);
        assert_eq!(
            handle_sse_line(r#"data: {"type":"message_stop"}"#).unwrap(),
            None
        );
        assert_eq!(handle_sse_line("").unwrap(), None);
    }

    #[test]
    fn sse_overloaded_error_is_transient() {
        let line = r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = handle_sse_line(line).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn sse_invalid_request_error_is_fatal() {
        let line = r#"data: {"type":"error","error":{"type":"invalid_request_error","message":"too large"}}"#;
        let err = handle_sse_line(line).unwrap_err();
        assert!(!err.is_transient());
    }
}
