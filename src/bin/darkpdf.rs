//! CLI binary for darkpdf.
//!
//! A thin shim over the library crate: maps CLI flags to `InversionConfig`,
//! converts one file or a whole folder, or runs the HTTP service.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use darkpdf::pipeline::input::{collect_batch_inputs, dark_output_path};
use darkpdf::server::{serve, AppState, ServerConfig, DEFAULT_MAX_UPLOAD_BYTES};
use darkpdf::{
    invert_to_file, FailurePolicy, InversionConfig, InversionProgressCallback, InversionStats,
    MissingPagePolicy, PdfiumRasterizer, ProgressCallback, QualityPreset, Rasterizer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress bar plus one log line per page. Pages finish out of
/// order, so start times are tracked per page.
struct CliProgressCallback {
    bar: ProgressBar,
    label: String,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(label: String) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Opening");
        bar.set_message(label.clone());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            label,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Inverting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Clear the bar after a run that ended in an error.
    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl InversionProgressCallback for CliProgressCallback {
    fn on_inversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{}: {total_pages} pages", self.label))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, width: u32, height: u32) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{width}x{height} px")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        let msg: String = if error.chars().count() > 80 {
            let mut short: String = error.chars().take(79).collect();
            short.push('\u{2026}');
            short
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_inversion_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Invert one document (writes paper_dark.pdf next to it)
  darkpdf invert paper.pdf

  # Sharper output, explicit destination
  darkpdf invert --quality high paper.pdf -o night/paper.pdf

  # Every PDF in a folder, skipping files that are already *_dark.pdf
  darkpdf invert ./scans

  # Keep going past a broken page to see every failure
  darkpdf invert --keep-going broken.pdf

  # Run the upload service on port 8080, serving ./public
  darkpdf serve --bind 0.0.0.0:8080

QUALITY PRESETS:
  low        scale 0.5   ~36 DPI   small files
  standard   scale 1.0   ~72 DPI
  high       scale 2.0   ~144 DPI  crisp text
  print      scale 3.0   ~216 DPI  large files

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (or the directory holding it)
  RUST_LOG          Overrides -v / -q log filtering
  DARKPDF_*         Every flag has an env override, e.g. DARKPDF_SCALE
"#;

/// Invert PDF pages into a dark-mode PDF.
#[derive(Parser, Debug)]
#[command(
    name = "darkpdf",
    version,
    about = "Invert PDF pages into a dark-mode PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DARKPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DARKPDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invert one PDF, or every PDF in a directory.
    Invert(InvertArgs),
    /// Run the HTTP upload service.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct InvertArgs {
    /// PDF file, or a directory of PDF files.
    input: PathBuf,

    /// Output file (single input) or output directory (directory input).
    /// Defaults to `<name>_dark.pdf` next to each input.
    #[arg(short, long, env = "DARKPDF_OUTPUT")]
    output: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Print run statistics as JSON on stdout.
    #[arg(long, env = "DARKPDF_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DARKPDF_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "DARKPDF_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Directory served for non-API paths.
    #[arg(long, env = "DARKPDF_STATIC_DIR", default_value = "public")]
    static_dir: PathBuf,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "DARKPDF_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024))]
    max_upload_mb: usize,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Flags shared by `invert` and `serve`.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Resampling factor applied to every page (0.5 small … 3.0 large).
    #[arg(long, env = "DARKPDF_SCALE", default_value_t = 1.5, conflicts_with = "quality")]
    scale: f32,

    /// Named scale factor; overrides --scale.
    #[arg(long, env = "DARKPDF_QUALITY", value_enum)]
    quality: Option<QualityArg>,

    /// Pages processed at the same time (default: number of CPUs).
    #[arg(short, long, env = "DARKPDF_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Rasterisation resolution (36–600).
    #[arg(long, env = "DARKPDF_DPI", default_value_t = 72,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DARKPDF_PASSWORD")]
    password: Option<String>,

    /// Attempt every page even after one fails.
    #[arg(long, env = "DARKPDF_KEEP_GOING")]
    keep_going: bool,

    /// Leave out pages that render empty instead of failing.
    #[arg(long, env = "DARKPDF_SKIP_MISSING")]
    skip_missing: bool,

    /// Store image streams uncompressed.
    #[arg(long, env = "DARKPDF_NO_COMPRESS")]
    no_compress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum QualityArg {
    Low,
    Standard,
    High,
    Print,
}

impl From<QualityArg> for QualityPreset {
    fn from(v: QualityArg) -> Self {
        match v {
            QualityArg::Low => QualityPreset::Low,
            QualityArg::Standard => QualityPreset::Standard,
            QualityArg::High => QualityPreset::High,
            QualityArg::Print => QualityPreset::Print,
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The progress bar gives all the feedback that matters, so library INFO
    // logs are only shown when it is off.
    let show_progress = match &cli.command {
        Command::Invert(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
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

    match cli.command {
        Command::Invert(ref args) => run_invert(args, cli.quiet, show_progress).await,
        Command::Serve(ref args) => run_serve(args).await,
    }
}

async fn run_invert(args: &InvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    if args.input.is_dir() {
        return run_batch(args, quiet, show_progress).await;
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| dark_output_path(&args.input));
    let stats = invert_one(&args.input, &output, &args.pipeline, show_progress)
        .await
        .with_context(|| format!("Failed to invert {}", args.input.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !quiet {
        print_summary(&stats, &output);
    }
    Ok(())
}

/// Convert every eligible PDF in a folder; one failure does not stop the rest.
async fn run_batch(args: &InvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let inputs = collect_batch_inputs(&args.input)
        .with_context(|| format!("Failed to list {}", args.input.display()))?;
    if inputs.is_empty() {
        if !quiet {
            eprintln!("No PDF files found in {}", args.input.display());
        }
        return Ok(());
    }

    let mut report = Vec::with_capacity(inputs.len());
    let mut failures = 0usize;

    for input in &inputs {
        let output = match &args.output {
            Some(dir) => dir.join(
                dark_output_path(input)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            ),
            None => dark_output_path(input),
        };

        match invert_one(input, &output, &args.pipeline, show_progress).await {
            Ok(stats) => {
                if !quiet && !args.json {
                    print_summary(&stats, &output);
                }
                report.push(serde_json::json!({
                    "input": input,
                    "output": output,
                    "stats": stats,
                }));
            }
            Err(e) => {
                failures += 1;
                if !quiet && !args.json {
                    eprintln!("{} {}: {}", red("✘"), input.display(), e);
                }
                report.push(serde_json::json!({
                    "input": input,
                    "error": e.to_string(),
                }));
            }
        }
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !quiet {
        eprintln!(
            "{} {}/{} files inverted",
            if failures == 0 { green("✔") } else { cyan("⚠") },
            bold(&(inputs.len() - failures).to_string()),
            inputs.len()
        );
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} files failed", inputs.len());
    }
    Ok(())
}

async fn invert_one(
    input: &Path,
    output: &Path,
    args: &PipelineArgs,
    show_progress: bool,
) -> Result<InversionStats> {
    let progress = show_progress.then(|| CliProgressCallback::new(input.display().to_string()));
    let config = build_config(
        args,
        progress.clone().map(|cb| cb as ProgressCallback),
    )?;

    let result = invert_to_file(input, output, &config).await;
    if let (Err(_), Some(cb)) = (&result, &progress) {
        cb.abandon();
    }
    Ok(result?)
}

async fn run_serve(args: &ServeArgs) -> Result<()> {
    let config = build_config(&args.pipeline, None)?;
    let rasterizer: Arc<dyn Rasterizer> =
        PdfiumRasterizer::shared().context("Failed to load the pdfium library")?;

    let server = ServerConfig {
        bind: args.bind,
        static_dir: args.static_dir.clone(),
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };
    serve(AppState::new(rasterizer, config), &server)
        .await
        .with_context(|| format!("Server on {} failed", args.bind))
}

/// Map CLI args to `InversionConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<InversionConfig> {
    let mut builder = InversionConfig::builder()
        .scale_factor(args.scale)
        .render_dpi(args.dpi)
        .compress_output(!args.no_compress)
        .failure_policy(if args.keep_going {
            FailurePolicy::CompleteAll
        } else {
            FailurePolicy::CancelOnFirstError
        })
        .missing_pages(if args.skip_missing {
            MissingPagePolicy::Skip
        } else {
            MissingPagePolicy::Abort
        });

    if let Some(quality) = args.quality {
        builder = builder.quality(quality.into());
    }
    if let Some(n) = args.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(stats: &InversionStats, output: &Path) {
    let skipped = if stats.skipped_pages > 0 {
        format!("  ({} skipped)", stats.skipped_pages)
    } else {
        String::new()
    };
    eprintln!(
        "{}  {}/{} pages{}  {}ms  →  {}",
        green("✔"),
        stats.emitted_pages,
        stats.total_pages,
        skipped,
        stats.total_duration_ms,
        bold(&output.display().to_string()),
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "scale {}  ·  {} workers (peak {})  ·  {} KiB",
            stats.scale_factor,
            stats.concurrency,
            stats.peak_in_flight,
            stats.output_bytes / 1024
        )),
    );
}
