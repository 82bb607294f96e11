//! Append-only error log.
//!
//! Every per-document skip leaves a permanent trace in
//! `error/errors.log`. Each line is a one-element JSON array wrapping an
//! object whose field names are fixed by the downstream log tooling — do
//! not rename them. Entries are never mutated or deleted.

use chrono::Local;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One line of the error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Script name")]
    pub stage: String,
    #[serde(rename = "Prompt file name")]
    pub prompt_file: String,
    #[serde(rename = "Uploaded file name")]
    pub uploaded_file: String,
    #[serde(rename = "Error message")]
    pub message: String,
    #[serde(rename = "Complete AI response")]
    pub ai_response: String,
    #[serde(rename = "Processed file name")]
    pub processed_file: String,
}

impl ErrorLogEntry {
    /// A new entry stamped with the current local time.
    pub fn new(stage: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            stage: stage.to_string(),
            prompt_file: String::new(),
            uploaded_file: String::new(),
            message: message.into(),
            ai_response: String::new(),
            processed_file: String::new(),
        }
    }

    pub fn processed_file(mut self, name: impl Into<String>) -> Self {
        self.processed_file = name.into();
        self
    }

    pub fn prompt_file(mut self, name: impl Into<String>) -> Self {
        self.prompt_file = name.into();
        self
    }

    pub fn uploaded_file(mut self, name: impl Into<String>) -> Self {
        self.uploaded_file = name.into();
        self
    }

    pub fn ai_response(mut self, text: impl Into<String>) -> Self {
        self.ai_response = text.into();
        self
    }
}

/// Handle on the append-only log file inside the error directory.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(error_dir: &Path) -> Self {
        Self {
            path: error_dir.join("errors.log"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single line.
    ///
    /// Logging must never take the run down, so write failures degrade to a
    /// `warn!` instead of propagating.
    pub fn append(&self, entry: ErrorLogEntry) {
        if let Err(e) = self.try_append(&entry) {
            warn!("Could not write error log entry to {}: {e}", self.path.display());
        }
    }

    fn try_append(&self, entry: &ErrorLogEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(&[entry])
            .map_err(|e| std::io::Error::other(format!("serialise log entry: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_accumulate_one_json_array_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path());

        log.append(ErrorLogEntry::new("extract", "first failure").processed_file("a.pdf"));
        log.append(ErrorLogEntry::new("convert", "second failure").processed_file("b.json"));

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert!(first.is_array());
        assert_eq!(first[0]["Script name"], "extract");
        assert_eq!(first[0]["Processed file name"], "a.pdf");
        assert_eq!(first[0]["Error message"], "first failure");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second[0]["Script name"], "convert");
    }

    #[test]
    fn timestamp_is_iso8601_seconds() {
        let entry = ErrorLogEntry::new("merge", "x");
        // 2026-08-06T12:34:56 — date, 'T', time
        assert_eq!(entry.timestamp.len(), 19);
        assert_eq!(entry.timestamp.as_bytes()[10], b'T');
    }
}
