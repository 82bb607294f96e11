//! Upload-then-generate backend (Gemini Files API).
//!
//! The document is uploaded once through the media-upload endpoint, then
//! referenced by URI in a separate `generateContent` call. Gemini processes
//! uploaded PDFs asynchronously, so the backend polls the file state until
//! it becomes `ACTIVE` before generating.

use crate::backend::{
    call_with_retry, classify_http, classify_request_error, decode_payload, RetryPolicy,
};
use crate::error::{BackendFailure, DocumentError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

const PROVIDER: &str = "gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com";
const ACTIVATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const ACTIVATION_POLL_BUDGET: u32 = 15;

/// Upload-then-generate extraction backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    name: String,
    uri: String,
    #[serde(default)]
    state: Option<String>,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(900))
            .build()
            .expect("reqwest client construction only fails on TLS misconfiguration");

        Self {
            client,
            api_key,
            model,
            retry,
        }
    }

    /// Extract a card batch from the document at `pdf_path`.
    pub async fn process(&self, pdf_path: &Path, prompt: &str) -> Result<Value, DocumentError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| DocumentError::io(pdf_path, e))?;

        let bytes_ref: &[u8] = &bytes;
        call_with_retry(self.retry, PROVIDER, move || {
            self.request_once(bytes_ref, prompt)
        })
        .await
        .map_err(Into::into)
    }

    /// One upload-then-generate round trip. The caller wraps this in the
    /// retry skeleton, so a transient failure anywhere in the sequence
    /// re-uploads from scratch — uploaded files are cheap and expire on
    /// their own.
    async fn request_once(&self, bytes: &[u8], prompt: &str) -> Result<Value, BackendFailure> {
        let upload_start = Instant::now();
        let file = self.upload(bytes).await?;
        debug!(
            "Uploaded {} bytes in {:.1}s as {}",
            bytes.len(),
            upload_start.elapsed().as_secs_f64(),
            file.name
        );

        let file = self.wait_until_active(file).await?;

        let generate_start = Instant::now();
        let raw = self.generate(&file.uri, prompt).await?;
        info!(
            "Content generated in {:.1}s",
            generate_start.elapsed().as_secs_f64()
        );

        decode_payload(PROVIDER, &raw)
    }

    async fn upload(&self, bytes: &[u8]) -> Result<FileInfo, BackendFailure> {
        let response = self
            .client
            .post(format!("{BASE_URL}/upload/v1beta/files"))
            .query(&[("key", self.api_key.as_str())])
            .header("X-Goog-Upload-Command", "start, upload, finalize")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", "application/pdf")
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http(PROVIDER, status.as_u16(), &body_text));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))?;
        Ok(upload.file)
    }

    /// Poll until the uploaded file leaves `PROCESSING`.
    ///
    /// A file still processing after the poll budget is reported as a
    /// transient failure so the retry skeleton gets another go at it.
    async fn wait_until_active(&self, file: FileInfo) -> Result<FileInfo, BackendFailure> {
        let mut current = file;

        for _ in 0..ACTIVATION_POLL_BUDGET {
            match current.state.as_deref() {
                None | Some("ACTIVE") => return Ok(current),
                Some("FAILED") => {
                    return Err(BackendFailure::Transport {
                        provider: PROVIDER,
                        detail: format!("uploaded file {} failed server-side processing", current.name),
                        transient: false,
                    })
                }
                Some(_) => {
                    debug!("File {} still processing; polling again", current.name);
                    sleep(ACTIVATION_POLL_INTERVAL).await;
                    current = self.fetch_file(&current.name).await?;
                }
            }
        }

        Err(BackendFailure::Transport {
            provider: PROVIDER,
            detail: format!("uploaded file {} never became ACTIVE", current.name),
            transient: true,
        })
    }

    async fn fetch_file(&self, name: &str) -> Result<FileInfo, BackendFailure> {
        let response = self
            .client
            .get(format!("{BASE_URL}/v1beta/{name}"))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http(PROVIDER, status.as_u16(), &body_text));
        }

        response
            .json()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))
    }

    async fn generate(&self, file_uri: &str, prompt: &str) -> Result<String, BackendFailure> {
        let body = json!({
            "contents": [{
                "parts": [
                    {"file_data": {"mime_type": "application/pdf", "file_uri": file_uri}},
                    {"text": prompt},
                ],
            }],
        });

        let response = self
            .client
            .post(format!("{BASE_URL}/v1beta/models/{}:generateContent", self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http(PROVIDER, status.as_u16(), &body_text));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| classify_request_error(PROVIDER, &e))?;

        extract_response_text(&envelope).ok_or_else(|| BackendFailure::Parse {
            provider: PROVIDER,
            raw: envelope.to_string(),
        })
    }
}

/// Pull the generated text out of a `generateContent` envelope.
///
/// Long responses arrive split across several parts; they are concatenated
/// in order.
fn extract_response_text(envelope: &Value) -> Option<String> {
    let parts = envelope.pointer("/candidates/0/content/parts")?.as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_concatenates_parts_in_order() {
        let envelope = json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": "[{\"main"}, {"text": "_content\": \"q\"}]"}]
                }
            }]
        });
        assert_eq!(
            extract_response_text(&envelope).unwrap(),
            "[{\"main_content\": \"q\"}]"
        );
    }

    #[test]
    fn envelope_without_text_yields_none() {
        assert!(extract_response_text(&json!({})).is_none());
        assert!(extract_response_text(&json!({
            "candidates": [{"content": {"parts": [{"inline_data": {}}]}}]
        }))
        .is_none());
    }
}
