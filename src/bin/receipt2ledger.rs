//! CLI binary for receipt2ledger.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints the extraction as JSON. Persistence needs an
//! object store and a document store, so the binary stops at the analysis
//! step — it is the "what does this receipt say?" tool for scripting and for
//! trying out models.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt2ledger::pipeline::{input, quality};
use receipt2ledger::{analyze_capture, resolve_provider, CaptureSession, PipelineConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read one receipt photo (JSON to stdout)
  receipt2ledger receipt.jpg

  # Multi-page receipt: pass every page, in order
  receipt2ledger page-1.jpg page-2.jpg -o receipt.json

  # Photo straight from a URL
  receipt2ledger https://example.com/receipt.jpg

  # Quality verdict only, no extraction
  receipt2ledger --check-only receipt.jpg

  # Use a specific model, skip the quality gate
  receipt2ledger --provider openai --model gpt-4.1 --no-quality-gate receipt.jpg

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY               OpenAI API key
  ANTHROPIC_API_KEY            Anthropic API key
  GEMINI_API_KEY               Google Gemini API key
  RECEIPT2LEDGER_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  RECEIPT2LEDGER_MODEL         Override model ID

SETUP:
  1. Set API key:  export OPENAI_API_KEY=sk-...
  2. Analyse:      receipt2ledger receipt.jpg
"#;

/// Read photographed receipts into structured JSON using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "receipt2ledger",
    version,
    about = "Read photographed receipts into structured JSON using Vision LLMs",
    long_about = "Analyse photos of paper receipts (local files, URLs, or data-URIs) with a \
Vision Language Model and print the structured result — store, date, total, tax, and line \
items — as JSON. Supports OpenAI, Anthropic, Google Gemini, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Receipt photo(s): file paths or HTTP/HTTPS URLs. Multiple photos are
    /// treated as consecutive pages of ONE receipt.
    #[arg(required = true)]
    photos: Vec<String>,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "RECEIPT2LEDGER_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gemini-2.0-flash).
    #[arg(long, env = "RECEIPT2LEDGER_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "RECEIPT2LEDGER_PROVIDER")]
    provider: Option<String>,

    /// Run only the quality pre-check and print the verdict.
    #[arg(long)]
    check_only: bool,

    /// Skip the quality pre-check before extraction.
    #[arg(long, env = "RECEIPT2LEDGER_NO_QUALITY_GATE")]
    no_quality_gate: bool,

    /// Longest allowed image side in pixels after preprocessing.
    #[arg(long, env = "RECEIPT2LEDGER_MAX_DIMENSION", default_value_t = 1920)]
    max_dimension: u32,

    /// Byte budget per encoded image.
    #[arg(long, env = "RECEIPT2LEDGER_MAX_BYTES", default_value_t = 1024 * 1024)]
    max_bytes: usize,

    /// Retries on transient extraction failure.
    #[arg(long, env = "RECEIPT2LEDGER_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-model-call timeout in seconds.
    #[arg(long, env = "RECEIPT2LEDGER_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP fetch timeout for photo URLs, in seconds.
    #[arg(long, env = "RECEIPT2LEDGER_FETCH_TIMEOUT", default_value_t = 60)]
    fetch_timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "RECEIPT2LEDGER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT2LEDGER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "RECEIPT2LEDGER_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner is the user-facing feedback; keep library logs at error
    // level unless the user asks for more.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = PipelineConfig::builder()
        .max_dimension(cli.max_dimension)
        .max_encoded_bytes(cli.max_bytes)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .fetch_timeout_secs(cli.fetch_timeout)
        .quality_gate(!cli.no_quality_gate);
    if let Some(model) = cli.model.clone() {
        builder = builder.model(model);
    }
    if let Some(provider) = cli.provider.clone() {
        builder = builder.provider_name(provider);
    }
    let config = builder.build().context("invalid configuration")?;

    let spinner = make_spinner(cli.quiet || cli.no_progress);

    // ── Load and preprocess photos ───────────────────────────────────────
    let mut session = CaptureSession::new();
    for (i, photo) in cli.photos.iter().enumerate() {
        spinner.set_message(format!("loading photo {}/{}", i + 1, cli.photos.len()));
        let raw = input::load_photo(photo, config.fetch_timeout_secs)
            .await
            .with_context(|| format!("could not load '{photo}'"))?;
        session
            .add_raw(&raw, &config)
            .with_context(|| format!("could not preprocess '{photo}'"))?;
    }

    // ── Quality check only ───────────────────────────────────────────────
    if cli.check_only {
        spinner.set_message("checking photo quality");
        let provider = resolve_provider(&config)?;
        let verdict = quality::assess(&provider, &session.images()[0].image, &config).await;
        spinner.finish_and_clear();

        let status = if verdict.usable {
            green("usable")
        } else {
            red("not usable")
        };
        eprintln!("{} {}", bold("verdict:"), status);
        if !verdict.reason.is_empty() {
            eprintln!("{} {}", bold("reason:"), verdict.reason);
        }
        if !verdict.usable {
            std::process::exit(1);
        }
        return Ok(());
    }

    // ── Extraction ───────────────────────────────────────────────────────
    spinner.set_message(format!(
        "reading receipt ({} page{})",
        session.len(),
        if session.len() == 1 { "" } else { "s" }
    ));
    let result = analyze_capture(&session, &config).await?;
    spinner.finish_and_clear();

    let json = serde_json::to_string_pretty(&result)?;
    match cli.output {
        Some(path) => {
            std::fs::write(&path, format!("{json}\n"))
                .with_context(|| format!("could not write '{}'", path.display()))?;
            if !cli.quiet {
                eprintln!("{} {}", green("✓"), path.display());
            }
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }

    Ok(())
}

fn make_spinner(disabled: bool) -> ProgressBar {
    if disabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
