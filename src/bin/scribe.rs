//! CLI binary for edgequake-scribe.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TranscriptionConfig`, drives a `BatchProcessor` and writes the result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_scribe::pipeline::layout::SECTIONS_PER_PAGE;
use edgequake_scribe::progress::{PageComplete, SectionFailure, SectionProgress};
use edgequake_scribe::transcribe::{prepare, source_name, write_atomic, PreparedRun};
use edgequake_scribe::{
    inspect, DefaultPrompt, DocumentEstimate, PageSelection, ProcessorStatus, TranscriptStats,
    TranscriptionConfig, TranscriptionObserver, Vocabulary,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: one bar over all sections plus a log line per page.
struct CliProgress {
    bar: ProgressBar,
    section_errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            section_errors: AtomicUsize::new(0),
        })
    }
}

impl TranscriptionObserver for CliProgress {
    fn on_run_start(&self, estimate: &DocumentEstimate) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} sections  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(estimate.total_sections as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Transcribing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{} pages, {} sections (~{} min, ~${:.2})",
                estimate.total_pages,
                estimate.total_sections,
                estimate.estimated_minutes(),
                estimate.estimated_cost_usd
            ))
        ));
    }

    fn on_section_complete(&self, progress: &SectionProgress) {
        self.bar
            .set_message(format!("page {} section {}", progress.page, progress.section));
        self.bar.inc(1);
    }

    fn on_section_error(&self, failure: &SectionFailure) {
        self.section_errors.fetch_add(1, Ordering::SeqCst);
        let msg = failure.error.to_string();
        let msg = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!(
            "  {} Page {:>3} section {}  {}",
            red("✗"),
            failure.page,
            failure.section,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_page_complete(&self, page: &PageComplete) {
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page.page,
            dim(&format!("{:>4} lines", page.total_lines)),
        ));
    }

    fn on_page_error(&self, page: usize, _total_pages: usize, error: &str) {
        self.bar
            .println(format!("  {} Page {:>3}  {}", red("✗"), page, red(error)));
        self.bar.inc(SECTIONS_PER_PAGE as u64);
    }

    fn on_status_change(&self, status: ProcessorStatus) {
        match status {
            ProcessorStatus::Paused => self.bar.set_message("paused"),
            ProcessorStatus::Cancelled => self.bar.set_message("cancelling…"),
            _ => {}
        }
    }

    fn on_run_complete(&self, stats: &TranscriptStats) {
        self.bar.finish_and_clear();
        let failed = self.section_errors.load(Ordering::SeqCst);
        let mark = if stats.cancelled || failed > 0 {
            cyan("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{} {}/{} pages transcribed{}{}",
            mark,
            bold(&stats.processed_pages.to_string()),
            stats.total_pages,
            if failed > 0 {
                format!("  ({} sections failed)", red(&failed.to_string()))
            } else {
                String::new()
            },
            if stats.cancelled { "  (cancelled)" } else { "" },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transcribe to stdout via a vision LLM (provider auto-detected)
  scribe scan.pdf

  # Write Markdown to a file
  scribe scan.pdf -o scan.md

  # Use a transcription endpoint instead of an LLM provider
  scribe --endpoint https://example.org/.netlify/functions/transcribe \
         --api-key "$CLAUDE_API_KEY" scan.pdf -o scan.md

  # Specific pages, higher render scale, one retry per section
  scribe --pages 3-7 --scale 3 --max-retries 1 book.pdf

  # Reference vocabulary for archaic scripts
  scribe --vocabulary words.json chronicle.pdf -o chronicle.md

  # Estimate sections, time and cost only
  scribe --estimate-only scan.pdf

  # JSON output
  scribe --json scan.pdf > scan.json

CONTROL:
  Ctrl-C   stop after the current section; completed pages are still written.
           Press twice to abort immediately.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  SCRIBE_ENDPOINT         Transcription endpoint URL
  SCRIBE_API_KEY          Key forwarded to the endpoint
"#;

/// Transcribe scanned PDFs and images into line-numbered text.
#[derive(Parser, Debug)]
#[command(
    name = "scribe",
    version,
    about = "Transcribe scanned PDFs and images into line-numbered text",
    long_about = "Transcribe scanned documents (local files or URLs) into line-numbered text. \
Each page is cut into four overlapping bands that are recognized one by one by a vision \
service, then merged and renumbered per page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/image path or HTTP/HTTPS URL.
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "SCRIBE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output structured JSON (TranscriptOutput) instead of Markdown.
    #[arg(long, env = "SCRIBE_JSON")]
    json: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "SCRIBE_PAGES", default_value = "all")]
    pages: String,

    /// Render scale relative to the page's natural size (0.5–6.0).
    #[arg(long, env = "SCRIBE_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Transcription endpoint URL. Takes precedence over LLM providers.
    #[arg(long, env = "SCRIBE_ENDPOINT")]
    endpoint: Option<String>,

    /// API key forwarded to the transcription endpoint.
    #[arg(long, env = "SCRIBE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Per-section request timeout in seconds.
    #[arg(long, env = "SCRIBE_TIMEOUT", default_value_t = 25)]
    timeout: u64,

    /// Extra attempts per section on a retryable failure.
    #[arg(long, env = "SCRIBE_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Pause between pages in milliseconds.
    #[arg(long, env = "SCRIBE_PAGE_PAUSE_MS", default_value_t = 100)]
    page_pause_ms: u64,

    /// JSON file of reference words appended to every prompt.
    #[arg(long, env = "SCRIBE_VOCABULARY")]
    vocabulary: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SCRIBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print the page count and time/cost estimate, no transcription.
    #[arg(long)]
    estimate_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "SCRIBE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCRIBE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.estimate_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Estimate-only mode ───────────────────────────────────────────────
    if cli.estimate_only {
        let estimate = inspect(&cli.input, &config)
            .await
            .context("Failed to open document")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&estimate).context("Failed to serialise estimate")?
            );
        } else {
            println!("File:       {}", cli.input);
            println!("Pages:      {}", estimate.total_pages);
            println!("Sections:   {}", estimate.total_sections);
            println!("Est. time:  ~{} min", estimate.estimated_minutes());
            println!("Est. cost:  ~${:.2}", estimate.estimated_cost_usd);
        }
        return Ok(());
    }

    // ── Prepare and load ─────────────────────────────────────────────────
    let PreparedRun {
        mut processor,
        input: _input,
    } = prepare(&cli.input, &config)
        .await
        .context("Failed to set up transcription")?;

    if show_progress {
        processor.set_observer(CliProgress::new());
    }
    processor.load().await.context("Failed to load document")?;

    // ── Ctrl-C → cooperative cancel ──────────────────────────────────────
    let handle = processor.handle();
    let quiet = cli.quiet;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !quiet {
                eprintln!(
                    "\n{} finishing the current section, press Ctrl-C again to abort",
                    cyan("⏸")
                );
            }
            handle.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let output = processor
        .process_all()
        .await
        .context("Transcription failed")?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output.to_markdown(&source_name(&cli.input))
    };

    match cli.output {
        Some(ref path) => {
            write_atomic(path, rendered.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} lines  {}ms  →  {}",
                    if output.failed_sections.is_empty() && !output.stats.cancelled {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    output.total_lines(),
                    output.stats.duration_ms,
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                out.write_all(b"\n").ok();
            }
            if !cli.quiet && !show_progress {
                eprintln!(
                    "Transcribed {}/{} pages in {}ms ({} sections failed)",
                    output.stats.processed_pages,
                    output.stats.total_pages,
                    output.stats.duration_ms,
                    output.stats.failed_sections
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `TranscriptionConfig`.
fn build_config(cli: &Cli) -> Result<TranscriptionConfig> {
    let pages = PageSelection::parse(&cli.pages).context("Invalid --pages")?;

    let mut prompt = DefaultPrompt::new();
    if let Some(ref path) = cli.vocabulary {
        let vocabulary = Vocabulary::from_file(path).context("Invalid --vocabulary")?;
        prompt = prompt.with_vocabulary(vocabulary);
    }

    let mut builder = TranscriptionConfig::builder()
        .pages(pages)
        .scale(cli.scale)
        .request_timeout_secs(cli.timeout)
        .max_retries(cli.max_retries)
        .page_pause_ms(cli.page_pause_ms)
        .download_timeout_secs(cli.download_timeout)
        .prompt(Arc::new(prompt));

    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }

    builder.build().context("Invalid configuration")
}
