//! Page counting and page-range extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so the sequential pipeline's worker thread never stalls on
//! CPU-bound PDF parsing.
//!
//! Pages are only ever counted and copied here, never rendered: the
//! extraction services read the PDF themselves, so rasterisation would be
//! wasted work.

use crate::error::DocumentError;
use crate::segment::Segment;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Number of pages in the document at `path`.
pub async fn page_count(path: &Path) -> Result<usize, DocumentError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || page_count_blocking(&owned))
        .await
        .map_err(|e| {
            DocumentError::io(
                path,
                std::io::Error::other(format!("page-count task panicked: {e}")),
            )
        })?
}

fn page_count_blocking(path: &Path) -> Result<usize, DocumentError> {
    let pdfium = Pdfium::default();
    let document = load_document(&pdfium, path)?;
    Ok(document.pages().len() as usize)
}

/// Copy the pages of `segment` from `src` into a new document at `dest`.
pub async fn extract_range(src: &Path, segment: Segment, dest: &Path) -> Result<(), DocumentError> {
    let src_owned = src.to_path_buf();
    let dest_owned = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_range_blocking(&src_owned, segment, &dest_owned))
        .await
        .map_err(|e| {
            DocumentError::io(
                src,
                std::io::Error::other(format!("page-copy task panicked: {e}")),
            )
        })?
}

fn extract_range_blocking(src: &Path, segment: Segment, dest: &Path) -> Result<(), DocumentError> {
    let pdfium = Pdfium::default();
    let source = load_document(&pdfium, src)?;

    let mut target = pdfium
        .create_new_pdf()
        .map_err(|e| pdfium_io(dest, "create segment document", e))?;

    // FPDF_ImportPages takes a 1-based page-range string.
    let range = format!("{}-{}", segment.start + 1, segment.end + 1);
    target
        .pages_mut()
        .copy_pages_from_document(&source, &range, 0)
        .map_err(|e| pdfium_io(src, "copy page range", e))?;

    target
        .save_to_file(dest)
        .map_err(|e| pdfium_io(dest, "save segment document", e))?;

    debug!(
        "Copied {} ({} pages) from {} to {}",
        segment,
        segment.len(),
        src.display(),
        dest.display()
    );

    Ok(())
}

fn load_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, DocumentError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| pdfium_io(path, "open document", e))
}

fn pdfium_io(path: &Path, action: &str, e: PdfiumError) -> DocumentError {
    DocumentError::io(
        path,
        std::io::Error::other(format!("pdfium failed to {action}: {e:?}")),
    )
}
