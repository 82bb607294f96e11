//! External PDF compression via Ghostscript.
//!
//! Oversized slide decks blow past the extraction services' request limits,
//! so they are squeezed through `gs` with the `/ebook` preset before upload.
//! The wrapper never raises into the pipeline: it always returns an outcome
//! carrying success plus whatever Ghostscript wrote to stderr, and the
//! caller decides what to do with a failure.

use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// What one compression attempt produced.
#[derive(Debug)]
pub struct CompressionOutcome {
    pub success: bool,
    /// Ghostscript's stderr (or the spawn error), kept for the error log.
    pub diagnostics: String,
}

/// Compress `input` into `output` with Ghostscript.
///
/// Success requires a zero exit status *and* a non-empty output file —
/// Ghostscript sometimes exits 0 after writing nothing useful.
pub async fn compress_pdf(input: &Path, output: &Path) -> CompressionOutcome {
    debug!("Compressing {} -> {}", input.display(), output.display());

    let result = Command::new("gs")
        .arg("-sDEVICE=pdfwrite")
        .arg("-dCompatibilityLevel=1.4")
        .arg("-dPDFSETTINGS=/ebook")
        .arg("-dNOPAUSE")
        .arg("-dQUIET")
        .arg("-dBATCH")
        .arg(format!("-sOutputFile={}", output.display()))
        .arg(input)
        .output()
        .await;

    match result {
        Ok(out) => {
            let wrote_output = output
                .metadata()
                .map(|m| m.len() > 0)
                .unwrap_or(false);
            CompressionOutcome {
                success: out.status.success() && wrote_output,
                diagnostics: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            }
        }
        Err(e) => CompressionOutcome {
            success: false,
            diagnostics: format!("failed to run gs: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_input_reports_failure_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = compress_pdf(
            &dir.path().join("does-not-exist.pdf"),
            &dir.path().join("out.pdf"),
        )
        .await;
        // Either gs is absent (spawn error) or it exits non-zero; both are
        // failures, never a panic.
        assert!(!outcome.success);
    }
}
