//! Integration tests for the filesystem-facing pipeline stages.
//!
//! Everything here runs against a temp directory tree and exercises the
//! stages that need no network: sanitize, convert, merge, and the
//! coordinator's stage-level failure behaviour. The extract stage needs a
//! live extraction service and is covered by its unit tests instead.

use pdf2anki::errlog::ErrorLog;
use pdf2anki::pipeline::queue::WorkQueue;
use pdf2anki::pipeline::{convert, merge, sanitize};
use pdf2anki::{Card, PipelineConfig, PipelineError};
use std::path::Path;

fn config_at(root: &Path) -> PipelineConfig {
    let config = PipelineConfig::builder(root.join("data"), root.join("prompts"))
        .build()
        .unwrap();
    config.layout.ensure().unwrap();
    config
}

fn write_cards(path: &Path, cards: &[Card]) {
    let json = serde_json::to_string_pretty(cards).unwrap();
    std::fs::write(path, json).unwrap();
}

#[tokio::test]
async fn sanitize_then_convert_then_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());
    let queue = WorkQueue::new(config.layout.clone());
    let log = ErrorLog::new(&config.layout.error());

    // ── Sanitize: accented names become queue-safe ───────────────────────
    std::fs::write(
        config.layout.raw().join("Néphro Cours 1.pdf"),
        b"%PDF-1.4 fake",
    )
    .unwrap();
    let counts = sanitize::run(&config, &queue, &log).await.unwrap();
    assert_eq!(counts.processed, 1);
    assert!(config.layout.slides().join("Nephro_Cours_1.pdf").is_file());

    // ── Convert: intermediates (as the extract stage would write them) ──
    write_cards(
        &config.layout.json().join("Nephro_Cours_1.json"),
        &[
            Card {
                main_content: "{{c1:GFR}} falls in CKD".into(),
                extra_field: "Slide 4".into(),
                importance_value: "High Nephro_Cours_1".into(),
            },
            Card {
                main_content: "Creatinine | urea ratio".into(),
                extra_field: "Slide 7".into(),
                importance_value: "Nephro_Cours_1".into(),
            },
        ],
    );

    let (counts, cards_written) = convert::run(&config, &queue, &log).unwrap();
    assert_eq!(counts.processed, 1);
    assert_eq!(cards_written, 2);

    let deck = std::fs::read_to_string(config.layout.csv().join("Nephro_Cours_1.csv")).unwrap();
    // Cloze marker repaired, pipe-containing field quoted, no header.
    assert_eq!(
        deck,
        "{{c1::GFR}} falls in CKD|Slide 4|High Nephro_Cours_1\n\
         \"Creatinine | urea ratio\"|Slide 7|Nephro_Cours_1\n"
    );

    // ── Merge: one deck in, one master out ───────────────────────────────
    let written = merge::run(&config.layout.csv(), "_MASTERDECK", &log)
        .unwrap()
        .unwrap();
    assert_eq!(written, "_MASTERDECK.csv");
    let merged = std::fs::read_to_string(config.layout.csv().join(&written)).unwrap();
    assert_eq!(merged, deck);
}

#[test]
fn merge_excludes_prior_masters_and_probes_a_fresh_name() {
    let dir = tempfile::tempdir().unwrap();
    let csv_dir = dir.path().to_path_buf();
    let log = ErrorLog::new(dir.path());

    std::fs::write(csv_dir.join("_MASTERDECK.csv"), "stale1\n").unwrap();
    std::fs::write(csv_dir.join("_MASTERDECK_2.csv"), "stale2\n").unwrap();
    std::fs::write(csv_dir.join("lectureA.csv"), "a|b|c").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(csv_dir.join("lectureB.csv"), "d|e|f\n").unwrap();

    let written = merge::run(&csv_dir, "_MASTERDECK", &log).unwrap().unwrap();
    assert_eq!(written, "_MASTERDECK_3.csv");

    // Newline inserted between the unterminated deck and the next one.
    let merged = std::fs::read_to_string(csv_dir.join("_MASTERDECK_3.csv")).unwrap();
    assert_eq!(merged, "a|b|c\nd|e|f\n");
}

#[test]
fn per_document_failures_are_isolated_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());
    let queue = WorkQueue::new(config.layout.clone());
    let log = ErrorLog::new(&config.layout.error());

    // One good intermediate, one malformed, one with a schema violation.
    write_cards(
        &config.layout.json().join("good.json"),
        &[Card {
            main_content: "q".into(),
            extra_field: "e".into(),
            importance_value: "t".into(),
        }],
    );
    std::fs::write(config.layout.json().join("broken.json"), "{{{").unwrap();
    std::fs::write(
        config.layout.json().join("not_a_list.json"),
        r#"{"main_content": "q"}"#,
    )
    .unwrap();

    let (counts, cards_written) = convert::run(&config, &queue, &log).unwrap();
    assert_eq!(counts.processed, 1);
    assert_eq!(counts.skipped, 2);
    assert_eq!(cards_written, 1);

    // Both skips left append-only log entries.
    let log_content = std::fs::read_to_string(log.path()).unwrap();
    let lines: Vec<&str> = log_content.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let entry: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(entry[0]["Script name"], "convert");
        assert!(!entry[0]["Timestamp"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn missing_prompt_is_a_stage_level_abort() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());

    let slide = config.layout.slides().join("untouched.pdf");
    std::fs::write(&slide, b"%PDF-1.4").unwrap();

    let err = pdf2anki::run(&config).await.unwrap_err();
    assert!(matches!(err, PipelineError::PromptNotFound { .. }));

    // Abort happened before the extract stage touched the queue.
    assert!(slide.is_file());
    assert!(!config.layout.error().join("errors.log").exists());
}

#[test]
fn dropped_cards_reduce_the_batch_without_failing_it() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_at(dir.path());
    let queue = WorkQueue::new(config.layout.clone());
    let log = ErrorLog::new(&config.layout.error());

    std::fs::write(
        config.layout.json().join("partial.json"),
        r#"[
            {"main_content": "complete", "extra_field": "e", "importance_value": "t"},
            {"main_content": "missing extra", "importance_value": "t"}
        ]"#,
    )
    .unwrap();

    let (counts, cards_written) = convert::run(&config, &queue, &log).unwrap();
    assert_eq!(counts.processed, 1);
    assert_eq!(counts.skipped, 0);
    assert_eq!(cards_written, 1);

    let deck = std::fs::read_to_string(config.layout.csv().join("partial.csv")).unwrap();
    assert_eq!(deck, "complete|e|t\n");
}
