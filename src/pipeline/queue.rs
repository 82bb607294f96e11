//! The directory-as-queue.
//!
//! Documents advance through the pipeline by being moved between the
//! directories of [`DirLayout`]; there is no database and no in-memory
//! state to drift out of sync with the disk. A file sitting in a stage
//! directory *is* the claim that it still needs that stage — which is the
//! whole cross-run resumption story: whatever wasn't moved gets picked up
//! again on the next run.
//!
//! [`WorkQueue`] is the only mover. Stages list their pending files through
//! it and the coordinator retires or parks them through it; nothing else in
//! the crate touches the tree.

use crate::config::DirLayout;
use std::path::{Path, PathBuf};

/// Lifecycle position of a document, keyed to the directory that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Unsanitised intake PDFs.
    Raw,
    /// Sanitised PDFs awaiting extraction.
    Sanitized,
    /// JSON intermediates awaiting CSV conversion.
    Extracted,
    /// Per-document CSV decks.
    Converted,
}

impl Stage {
    /// The file extension this stage consumes.
    pub fn extension(&self) -> &'static str {
        match self {
            Stage::Raw | Stage::Sanitized => "pdf",
            Stage::Extracted => "json",
            Stage::Converted => "csv",
        }
    }

    pub fn dir(&self, layout: &DirLayout) -> PathBuf {
        match self {
            Stage::Raw => layout.raw(),
            Stage::Sanitized => layout.slides(),
            Stage::Extracted => layout.json(),
            Stage::Converted => layout.csv(),
        }
    }

    pub fn done_dir(&self, layout: &DirLayout) -> PathBuf {
        match self {
            Stage::Raw => layout.raw_done(),
            Stage::Sanitized => layout.slides_done(),
            Stage::Extracted => layout.json_done(),
            Stage::Converted => layout.csv_done(),
        }
    }
}

/// Single authoritative mutator of the directory tree.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    layout: DirLayout,
}

impl WorkQueue {
    pub fn new(layout: DirLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DirLayout {
        &self.layout
    }

    /// Files waiting in a stage's directory, sorted case-insensitively.
    pub fn pending(&self, stage: Stage) -> std::io::Result<Vec<PathBuf>> {
        list_files(&stage.dir(&self.layout), stage.extension())
    }

    /// Move a processed file into its stage's DONE subdirectory.
    pub fn retire(&self, file: &Path, stage: Stage) -> std::io::Result<PathBuf> {
        move_into(file, &stage.done_dir(&self.layout))
    }

    /// Move a failed file into the error directory.
    pub fn park_error(&self, file: &Path) -> std::io::Result<PathBuf> {
        move_into(file, &self.layout.error())
    }
}

/// Plain files in `dir` with the given extension (case-insensitive),
/// sorted by lowercased name for a stable processing order.
pub fn list_files(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();

    files.sort_by_key(|path| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    Ok(files)
}

/// First unused path for `file_name` in `dir`, probing `name_2.ext`,
/// `name_3.ext`, … on collision. Never overwrites.
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (file_name.to_string(), String::new()),
    };

    let mut counter = 2u32;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Move `file` into `dest_dir` under a collision-free name.
pub fn move_into(file: &Path, dest_dir: &Path) -> std::io::Result<PathBuf> {
    let file_name = file
        .file_name()
        .ok_or_else(|| std::io::Error::other(format!("no file name in {}", file.display())))?
        .to_string_lossy()
        .into_owned();

    std::fs::create_dir_all(dest_dir)?;
    let target = unique_path(dest_dir, &file_name);
    std::fs::rename(file, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_filters_extension_and_sorts_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Beta.PDF", "alpha.pdf", "notes.txt", "gamma.pdf"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("DONE")).unwrap();

        let files = list_files(dir.path(), "pdf").unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha.pdf", "Beta.PDF", "gamma.pdf"]);
    }

    #[test]
    fn unique_path_probes_numeric_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            unique_path(dir.path(), "deck.csv"),
            dir.path().join("deck.csv")
        );

        std::fs::write(dir.path().join("deck.csv"), "").unwrap();
        std::fs::write(dir.path().join("deck_2.csv"), "").unwrap();
        assert_eq!(
            unique_path(dir.path(), "deck.csv"),
            dir.path().join("deck_3.csv")
        );
    }

    #[test]
    fn move_into_keeps_both_files_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("DONE");
        std::fs::create_dir(&done).unwrap();

        let first = dir.path().join("a.pdf");
        std::fs::write(&first, "one").unwrap();
        std::fs::write(done.join("a.pdf"), "existing").unwrap();

        let target = move_into(&first, &done).unwrap();
        assert_eq!(target, done.join("a_2.pdf"));
        assert_eq!(std::fs::read_to_string(done.join("a.pdf")).unwrap(), "existing");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "one");
    }

    #[test]
    fn queue_retires_into_stage_done_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = crate::config::DirLayout::new(dir.path());
        layout.ensure().unwrap();
        let queue = WorkQueue::new(layout.clone());

        let slide = layout.slides().join("deck.pdf");
        std::fs::write(&slide, "x").unwrap();

        assert_eq!(queue.pending(Stage::Sanitized).unwrap(), vec![slide.clone()]);
        let retired = queue.retire(&slide, Stage::Sanitized).unwrap();
        assert_eq!(retired, layout.slides_done().join("deck.pdf"));
        assert!(queue.pending(Stage::Sanitized).unwrap().is_empty());
    }
}
