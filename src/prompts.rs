//! Prompt loading.
//!
//! Prompts live as plain `.txt` files in a directory so card styles can be
//! iterated on without recompiling. A logical name resolves with or without
//! the extension; a missing prompt is a config failure that aborts the run
//! before any document is touched.

use crate::error::PipelineError;
use std::path::Path;

/// Load a prompt by logical name.
pub fn load(prompts_dir: &Path, name: &str) -> Result<String, PipelineError> {
    let file_name = if name.ends_with(".txt") {
        name.to_string()
    } else {
        format!("{name}.txt")
    };

    let path = prompts_dir.join(&file_name);
    if !path.is_file() {
        return Err(PipelineError::PromptNotFound {
            name: name.to_string(),
            path,
        });
    }

    std::fs::read_to_string(&path).map_err(|e| PipelineError::StageIo {
        stage: "extract",
        path,
        source: e,
    })
}

/// All available prompt names (sorted, without extension).
pub fn list(prompts_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(prompts_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".txt").map(String::from)
        })
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_resolves_with_and_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("QACloze.txt"), "Make cards.").unwrap();

        assert_eq!(load(dir.path(), "QACloze").unwrap(), "Make cards.");
        assert_eq!(load(dir.path(), "QACloze.txt").unwrap(), "Make cards.");
    }

    #[test]
    fn missing_prompt_is_a_config_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path(), "NoSuchPrompt"),
            Err(PipelineError::PromptNotFound { .. })
        ));
    }

    #[test]
    fn list_is_sorted_and_extensionless() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();

        assert_eq!(list(dir.path()), vec!["a".to_string(), "b".to_string()]);
    }
}
