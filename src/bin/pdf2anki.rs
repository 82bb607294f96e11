//! CLI binary for pdf2anki.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints the run summary.

use anyhow::Result;
use clap::Parser;
use pdf2anki::{pipeline, prompts, BackendKind, CancelFlag, PipelineConfig, PipelineError};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process everything in ./data/raw_slides with Gemini, merge into a master deck
  pdf2anki --merge

  # Claude backend, custom prompt, tag prefix
  pdf2anki --backend claude --prompt QACloze --tag "Medical_"

  # Custom master deck name
  pdf2anki --merge custom_deck

  # Re-run over already-sanitized slides, keeping intermediates
  pdf2anki --skip-sanitize --no-cleanup

  # See which prompts are available
  pdf2anki --list-prompts

DIRECTORY LAYOUT (created under --data-dir):
  raw_slides/   unsanitised intake PDFs          (+ DONE/)
  slides/       sanitised PDFs awaiting extraction (+ DONE/)
  json/         JSON intermediates                (+ DONE/)
  csv/          per-document and merged decks     (+ DONE/)
  error/        failed files and errors.log

ENVIRONMENT VARIABLES:
  CLAUDE_API_KEY    Anthropic API key (ANTHROPIC_API_KEY also accepted)
  GEMINI_API_KEY    Google Gemini API key
  CLAUDE_MODEL      Override the Claude model ID
  GEMINI_MODEL      Override the Gemini model ID

  A .env file in the working directory is loaded automatically.
"#;

/// Convert lecture slide PDFs into Anki flashcard decks using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2anki",
    version,
    about = "Convert lecture slide PDFs into Anki flashcard decks using LLMs",
    long_about = "Run slide decks through an LLM extraction backend (Claude or Gemini) and emit \
pipe-delimited Anki decks. Documents move through a directory queue \
(raw_slides → slides → json → csv); whatever a run does not finish is picked \
up again by the next one.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// AI backend to use.
    #[arg(short, long, value_enum, env = "PDF2ANKI_BACKEND", default_value = "gemini")]
    backend: BackendArg,

    /// Prompt file to use (without .txt extension).
    #[arg(short, long, env = "PDF2ANKI_PROMPT", default_value = "QAClozeSourceYield")]
    prompt: String,

    /// Tag prefix prepended before the per-document filename tag.
    #[arg(short, long, env = "PDF2ANKI_TAG", default_value = "")]
    tag: String,

    /// Merge CSVs into a master deck; optionally provide a custom name.
    #[arg(short, long, num_args = 0..=1, default_missing_value = "_MASTERDECK")]
    merge: Option<String>,

    /// Skip the file sanitization step.
    #[arg(long)]
    skip_sanitize: bool,

    /// Keep intermediate JSON files and individual CSVs after processing.
    #[arg(long)]
    no_cleanup: bool,

    /// Root of the pipeline's directory tree.
    #[arg(long, env = "PDF2ANKI_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Directory holding prompt .txt files.
    #[arg(long, env = "PDF2ANKI_PROMPTS_DIR", default_value = "prompts")]
    prompts_dir: PathBuf,

    /// List available prompts and exit.
    #[arg(long)]
    list_prompts: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    Claude,
    Gemini,
}

impl From<BackendArg> for BackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Claude => BackendKind::Claude,
            BackendArg::Gemini => BackendKind::Gemini,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; a missing file is not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // ── List-prompts mode ────────────────────────────────────────────────
    if cli.list_prompts {
        let names = prompts::list(&cli.prompts_dir);
        if names.is_empty() {
            eprintln!("No prompts found in {}", cli.prompts_dir.display());
        } else {
            for name in names {
                println!("{name}");
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let config = PipelineConfig::builder(&cli.data_dir, &cli.prompts_dir)
        .backend(cli.backend.clone().into())
        .prompt_name(&cli.prompt)
        .tag_prefix(&cli.tag)
        .merge_output(cli.merge.clone())
        .skip_sanitize(cli.skip_sanitize)
        .cleanup(!cli.no_cleanup)
        .build()?;

    // ── Cooperative Ctrl-C ───────────────────────────────────────────────
    // The flag is honoured between documents and stages, so the in-flight
    // document finishes before the run stops.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupt received; stopping after the current document…");
                cancel.request();
            }
        });
    }

    // ── Run ──────────────────────────────────────────────────────────────
    match pipeline::run_with_cancel(&config, &cancel).await {
        Ok(summary) => {
            if !cli.quiet {
                eprintln!(
                    "Done: {} sanitized, {} extracted, {} converted, {} cards written, {} skipped",
                    summary.sanitized,
                    summary.extracted,
                    summary.converted,
                    summary.cards_written,
                    summary.skipped
                );
                if let Some(deck) = summary.merged_deck {
                    eprintln!("Merged deck: {deck}");
                }
            }
            Ok(())
        }
        Err(PipelineError::Interrupted) => {
            eprintln!("Pipeline interrupted by user.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            std::process::exit(1);
        }
    }
}
