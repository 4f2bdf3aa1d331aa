//! CLI binary for minutebook-sections.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ClassifierConfig`, writes the result file and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use minutebook_sections::{
    classify_to_file, ClassificationOutput, ClassificationProgressCallback, ClassifierConfig,
    ProgressCallback, API_KEY_ENV, API_URL_ENV, DEFAULT_MODEL, MODEL_ENV,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a bar over batches during the vision phase, then a
/// spinner while chunk strategies run. Batches complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Rendering");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, batch_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&batch_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ClassificationProgressCallback for CliProgressCallback {
    fn on_classification_start(&self, total_pages: usize, total_batches: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_batches as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Reading");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total_pages} pages in {total_batches} batches"))
        ));
    }

    fn on_batch_start(&self, batch_num: usize, _total_batches: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(batch_num, Instant::now());
        }
    }

    fn on_batch_complete(&self, batch_num: usize, total_batches: usize, text_len: usize) {
        let secs = self.elapsed_secs(batch_num);
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            batch_num,
            total_batches,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch_num: usize, total_batches: usize, error: &str) {
        let secs = self.elapsed_secs(batch_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}  {}",
            red("✗"),
            batch_num,
            total_batches,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_strategy_start(&self, chunk_count: usize) {
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        self.bar.set_prefix("Structuring");
        self.bar.set_message(format!("{chunk_count} chunk(s)"));
    }

    fn on_strategy_failed(&self, chunk_count: usize) {
        self.bar.println(format!(
            "  {} {} chunk strategy failed",
            cyan("⚠"),
            chunk_count
        ));
    }

    fn on_classification_complete(&self, section_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let mark = if section_count == 0 {
            red("✘")
        } else if failed > 0 {
            cyan("⚠")
        } else {
            green("✔")
        };
        eprintln!(
            "{} {} sections identified{}",
            mark,
            bold(&section_count.to_string()),
            if failed > 0 {
                format!("  ({} batches failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify and write result.json
  minutebook minute_book.pdf

  # Custom output path and model
  minutebook minute_book.pdf -o sections.json --model gpt-4o-mini

  # Smaller batches, fewer parallel requests
  minutebook --batch-size 4 --concurrency 4 minute_book.pdf

  # Only try 1 and 2 chunk strategies, close gaps up to 10 pages
  minutebook --strategies 1,2 --max-gap 10 minute_book.pdf

  # Custom section categories (one per line)
  minutebook --sections-file sections.txt minute_book.pdf

  # Full output with stats on stdout
  minutebook --json minute_book.pdf > run.json

ENVIRONMENT VARIABLES:
  MINUTEBOOK_API_URL      Backend base URL (serves /process-pdf and /ask)
  MINUTEBOOK_API_KEY      Bearer token for the backend
  MINUTEBOOK_MODEL        Model selector forwarded to the backend
  MINUTEBOOK_LABEL_FONT   TTF font used for page labels in batch grids
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Split a scanned corporate minute book into labelled page ranges.
#[derive(Parser, Debug)]
#[command(
    name = "minutebook",
    version,
    about = "Split a corporate minute-book PDF into labelled page-range sections",
    long_about = "Render the minute book in batches of page previews, read each batch with a \
vision model, then ask a text model for the section boundaries. The result is written as \
{\"sections\": [{\"name\", \"startPage\", \"endPage\"}, ...]}.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Minute-book PDF file.
    input: PathBuf,

    /// Result file.
    #[arg(short, long, env = "MINUTEBOOK_OUTPUT", default_value = "result.json")]
    output: PathBuf,

    /// Model selector forwarded with every request.
    #[arg(long, env = MODEL_ENV, default_value = DEFAULT_MODEL)]
    model: String,

    /// Backend base URL.
    #[arg(long, env = API_URL_ENV)]
    api_url: Option<String>,

    /// Backend bearer token.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Pages per vision batch.
    #[arg(short, long, env = "MINUTEBOOK_BATCH_SIZE", default_value_t = 6)]
    batch_size: usize,

    /// Concurrent vision requests.
    #[arg(short, long, env = "MINUTEBOOK_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Attempts per request, the first included.
    #[arg(long, env = "MINUTEBOOK_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "MINUTEBOOK_API_TIMEOUT", default_value_t = 50)]
    api_timeout: u64,

    /// Largest gap in pages closed by extending the preceding section.
    #[arg(long, env = "MINUTEBOOK_MAX_GAP", default_value_t = 5)]
    max_gap: u32,

    /// Chunk counts tried for structure resolution, coarsest first.
    #[arg(long, env = "MINUTEBOOK_STRATEGIES", value_delimiter = ',', default_value = "1,3,5")]
    strategies: Vec<usize>,

    /// Text file listing section names, one per line.
    #[arg(long, env = "MINUTEBOOK_SECTIONS_FILE")]
    sections_file: Option<PathBuf>,

    /// Print the full result with stats as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MINUTEBOOK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ClassificationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run classification ───────────────────────────────────────────────
    let start = Instant::now();
    let output = classify_to_file(&cli.input, &cli.output, &config)
        .await
        .context("Classification failed")?;
    let elapsed = start.elapsed();

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, elapsed, &cli.output);
    }

    Ok(())
}

/// Map CLI args to `ClassifierConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ClassifierConfig> {
    let mut builder = ClassifierConfig::builder()
        .model(cli.model.clone())
        .batch_size(cli.batch_size)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .request_timeout_secs(cli.api_timeout)
        .max_gap_fill(cli.max_gap)
        .chunk_strategies(cli.strategies.clone());

    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref path) = cli.sections_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read section names from {:?}", path))?;
        builder = builder.section_names(parse_section_names(&raw));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One name per line; blank lines and `#` comments are ignored.
fn parse_section_names(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn print_summary(output: &ClassificationOutput, elapsed: Duration, path: &std::path::Path) {
    let rule = "=".repeat(80);
    let stats = &output.stats;
    println!("\n{rule}");
    println!("{}", bold("Classification complete"));
    println!("{rule}");
    println!("Time:          {:.2}s", elapsed.as_secs_f64());
    println!("API requests:  {}", stats.api_requests);
    println!("Batches:       {} ({} failed)", stats.batches, stats.failed_batches);
    if let Some(chunks) = stats.strategy_chunks {
        println!("Strategy:      {chunks} chunk(s)");
    }
    println!("Sections:      {}", output.sections.len());
    println!("Result:        {}", path.display());

    if !output.sections.is_empty() {
        println!("\nSections:");
        for s in &output.sections {
            println!(
                "  {}: pages {}-{} ({} pages)",
                s.name,
                s.start_page,
                s.end_page,
                s.page_count()
            );
        }
    }
    println!("{rule}\n");
}
