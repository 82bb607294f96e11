//! Page-range planning for oversized documents.
//!
//! The inline-attach backend cannot send an arbitrarily large document in a
//! single request, so documents over the hard page cap are split into
//! contiguous, non-overlapping ranges. The split is balanced rather than
//! greedy: `ceil(total / max)` segments whose sizes differ by at most one
//! page, so no segment ends up with a tiny remainder tail.

use tracing::{info, warn};

/// A contiguous, inclusive page range `[start, end]`, 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    /// Number of pages covered; an inclusive range is never empty.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pages {}-{}", self.start + 1, self.end + 1)
    }
}

/// Plan the segments for a document of `total_pages`.
///
/// * `total_pages == 0` → empty plan (warned, not an error).
/// * `total_pages < min_pages` → one whole-document segment; sub-minimum is
///   unavoidable here and logged as informational.
/// * otherwise → `ceil(total / max_pages)` consecutive segments starting at
///   page 0, the first `total % count` of them one page larger.
///
/// A planned segment whose size falls outside `[min_pages, max_pages]` is
/// warned about but never rejected.
pub fn plan_segments(total_pages: usize, min_pages: usize, max_pages: usize) -> Vec<Segment> {
    if total_pages == 0 {
        warn!("Document has no pages; nothing to segment");
        return Vec::new();
    }

    if total_pages < min_pages {
        info!(
            "Document has {} pages (< {} minimum); using a single segment",
            total_pages, min_pages
        );
        return vec![Segment {
            start: 0,
            end: total_pages - 1,
        }];
    }

    let count = total_pages.div_ceil(max_pages);
    let base = total_pages / count;
    let remainder = total_pages % count;

    let mut segments = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let size = if i < remainder { base + 1 } else { base };
        let segment = Segment {
            start,
            end: start + size - 1,
        };
        if size < min_pages || size > max_pages {
            warn!(
                "Segment {} of {} has {} pages, outside [{}, {}]",
                i + 1,
                count,
                size,
                min_pages,
                max_pages
            );
        }
        segments.push(segment);
        start += size;
    }

    segments
}
