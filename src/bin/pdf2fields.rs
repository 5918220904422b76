//! CLI binary for pdf2fields.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and reports progress.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2fields::{
    run_batch_to_file, BatchProgressCallback, DocumentServiceConfig, ExtractionConfig,
    LanguageModelConfig, ProgressCallback, SuffixMatch,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Terminal progress callback: one bar for the batch plus a log line per
/// file. Works when files finish out of order (`--concurrency > 1`).
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-file wall-clock start times.
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Listing input directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, filename: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(filename))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_files} PDF files"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(filename.to_string(), Instant::now());
        }
        self.bar.println(format!("Processing {filename}..."));
        self.bar.set_message(filename.to_string());
    }

    fn on_field_extraction_start(&self, filename: &str, markdown_len: usize) {
        self.bar.println(format!(
            "OpenAI call started for {filename}...  {}",
            dim(&format!("{markdown_len} chars of markdown"))
        ));
    }

    fn on_file_complete(&self, index: usize, total: usize, filename: &str, success: bool) {
        let secs = self.elapsed_secs(filename);
        let (mark, note) = if success {
            (green("✓"), String::new())
        } else {
            (cyan("⚠"), red("unparseable reply"))
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            mark,
            index,
            total,
            filename,
            note,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let secs = self.elapsed_secs(filename);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            filename,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files extracted  ({} without fields)",
                if failed == total_files { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract the default fields from every PDF in the current directory
  pdf2fields

  # Another directory, another output file
  pdf2fields ./scans -o results.json

  # Custom field set
  pdf2fields ./invoices --fields invoice_number,total,due_date

  # Accept .PDF as well as .pdf, keep going past network errors
  pdf2fields ./scans --ignore-case --continue-on-error

  # Print run statistics as JSON on stdout
  pdf2fields ./scans --json

OUTPUT:
  A JSON array with one object per PDF, in directory-listing order:
    {"invoice_number": "INV-1", "MAWB": "...", "HAWB": "...", "Name": "...", "filename": "a.pdf"}
  A reply that is not a JSON object becomes:
    {"error": "Failed to parse JSON", "filename": "b.pdf"}

ENVIRONMENT VARIABLES:
  DOCUMENT_INTELLIGENCE_ENDPOINT  Azure AI Document Intelligence endpoint
  DOCUMENT_INTELLIGENCE_KEY       Document Intelligence subscription key
  AZURE_OPENAI_ENDPOINT           Azure OpenAI endpoint
  AZURE_OPENAI_KEY                Azure OpenAI API key
  AZURE_OPENAI_DEPLOYMENT         Chat deployment name (e.g. gpt-4o)
  RUST_LOG                        Overrides the log filter
"#;

/// Extract named fields from a directory of PDFs into one JSON file.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2fields",
    version,
    about = "Extract named fields from a directory of PDFs into one JSON file",
    long_about = "Runs every PDF in a directory through Azure AI Document Intelligence \
(layout → Markdown) and then Azure OpenAI in JSON mode to pull out a fixed set of fields. \
All records are written together as a single JSON array.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory scanned (non-recursively) for PDF files.
    #[arg(env = "PDF2FIELDS_INPUT_DIR", default_value = ".")]
    input_dir: PathBuf,

    /// Where the JSON array is written.
    #[arg(short, long, env = "PDF2FIELDS_OUTPUT", default_value = "output.json")]
    output: PathBuf,

    /// Comma-separated target fields. Default: invoice_number,MAWB,HAWB,Name.
    #[arg(long, env = "PDF2FIELDS_FIELDS", value_delimiter = ',')]
    fields: Vec<String>,

    /// Document Intelligence endpoint.
    #[arg(long, env = "DOCUMENT_INTELLIGENCE_ENDPOINT")]
    doc_endpoint: Option<String>,

    /// Document Intelligence subscription key.
    #[arg(long, env = "DOCUMENT_INTELLIGENCE_KEY", hide_env_values = true)]
    doc_key: Option<String>,

    /// Azure OpenAI endpoint.
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    openai_endpoint: Option<String>,

    /// Azure OpenAI API key.
    #[arg(long, env = "AZURE_OPENAI_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    /// Azure OpenAI chat deployment name.
    #[arg(long, env = "AZURE_OPENAI_DEPLOYMENT")]
    deployment: Option<String>,

    /// Layout model used for analysis.
    #[arg(long, env = "PDF2FIELDS_LAYOUT_MODEL", default_value = "prebuilt-layout")]
    layout_model: String,

    /// Azure OpenAI API version.
    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = "2025-01-01-preview")]
    api_version: String,

    /// Sampling temperature (0.0–2.0). Service default when unset.
    #[arg(long, env = "PDF2FIELDS_TEMPERATURE")]
    temperature: Option<f32>,

    /// Files processed at once. Output order is unaffected.
    #[arg(short, long, env = "PDF2FIELDS_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Also accept .PDF, .Pdf, … extensions.
    #[arg(long, env = "PDF2FIELDS_IGNORE_CASE")]
    ignore_case: bool,

    /// Record per-file network/credential errors instead of aborting.
    #[arg(long, env = "PDF2FIELDS_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Keep numbers, booleans and nested values as the model returned them.
    #[arg(long, env = "PDF2FIELDS_NO_COERCE")]
    no_coerce: bool,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF2FIELDS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Delay between layout status polls, in milliseconds.
    #[arg(long, env = "PDF2FIELDS_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Give up on one layout analysis after this many seconds.
    #[arg(long, env = "PDF2FIELDS_ANALYSIS_TIMEOUT", default_value_t = 300)]
    analysis_timeout: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "PDF2FIELDS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2FIELDS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2FIELDS_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2FIELDS_NO_PROGRESS")]
    no_progress: bool,

    /// Print run statistics as JSON on stdout.
    #[arg(long, env = "PDF2FIELDS_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar prints the per-file lines itself, so library INFO
    // logs are only shown when it is off.
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
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = run_batch_to_file(&config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&output.stats).context("Failed to serialise stats")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "Extraction complete. Check {}",
            bold(&cli.output.display().to_string())
        );
        eprintln!(
            "   {} extracted  /  {} parse failures  /  {} errors  —  {}ms total",
            stats.extracted, stats.parse_failures, stats.errors, stats.total_duration_ms,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_prompt_tokens.to_string()),
            dim(&stats.total_completion_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let suffix_match = if cli.ignore_case {
        SuffixMatch::IgnoreCase
    } else {
        SuffixMatch::CaseSensitive
    };

    let mut builder = ExtractionConfig::builder()
        .input_dir(&cli.input_dir)
        .output_path(&cli.output)
        .suffix_match(suffix_match)
        .concurrency(cli.concurrency)
        .coerce_values(!cli.no_coerce)
        .continue_on_error(cli.continue_on_error)
        .api_timeout_secs(cli.api_timeout);

    let fields: Vec<&str> = cli
        .fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if !fields.is_empty() {
        builder = builder.fields(fields);
    }

    // Missing credentials are left for the library to report per service.
    if let (Some(endpoint), Some(key)) = (&cli.doc_endpoint, &cli.doc_key) {
        let mut svc = DocumentServiceConfig::new(endpoint, key);
        svc.model_id = cli.layout_model.clone();
        svc.poll_interval_ms = cli.poll_interval_ms;
        svc.analysis_timeout_secs = cli.analysis_timeout;
        builder = builder.document_service(svc);
    }

    if let (Some(endpoint), Some(key), Some(deployment)) =
        (&cli.openai_endpoint, &cli.openai_key, &cli.deployment)
    {
        let mut llm = LanguageModelConfig::new(endpoint, key, deployment);
        llm.api_version = cli.api_version.clone();
        llm.temperature = cli.temperature;
        builder = builder.language_model(llm);
    }

    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
