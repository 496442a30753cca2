//! CLI binary for fchanger.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionOptions` / `ConverterConfig` / `EnrichmentConfig`, runs one
//! batch and writes the converted files.

use anyhow::{Context, Result};
use clap::Parser;
use fchanger::output::format_file_size;
use fchanger::{
    load_batch, write_artifacts, BatchProgressCallback, BatchReport, BatchStats, ConversionOptions,
    ConverterConfig, EnrichmentConfig, LlmEnricher, ProgressCallback, StatusKind,
    SupportedFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: a live progress bar plus one log line per
/// image. Images finish in any order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-item wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Self::with_bar(ProgressBar::new(0))
    }

    fn with_bar(bar: ProgressBar) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:30.green/238}] {pos:>1}/{len} images  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.bar.set_length(total_items as u64);
        self.bar.reset_eta();
    }

    fn on_item_start(&self, index: usize, name: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(name.to_string());
    }

    fn on_item_complete(&self, index: usize, name: &str, output_bytes: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:<32}  {:>10}  {}",
            green("✓"),
            name,
            dim(&format_file_size(output_bytes as u64)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, name: &str, error: String) {
        let secs = self.elapsed_secs(index);

        // Keep long decoder messages on one line.
        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };

        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    // The totals line is printed once, by `print_summary`.
    fn on_batch_complete(&self, _total_items: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two PNGs to WEBP in the current directory
  fchanger --to webp cat.png dog.png

  # JPEG at 80% quality into ./out
  fchanger --to jpg --quality 0.8 -o out photo.png scan.bmp

  # Download and convert
  fchanger --to avif https://example.com/banner.png

  # Let a vision model name the files
  fchanger --to webp --smart-names IMG_0042.png IMG_0043.png

  # Machine-readable report
  fchanger --to png --json *.gif > report.json

FORMATS:
  Name   Alpha  Quality  Notes
  ─────  ─────  ───────  ─────────────────────────────────────────
  png    ✓      -        lossless
  jpg    -      ✓        transparent areas become white
  webp   ✓      ✓        lossy colour, lossless alpha
  avif   ✓      ✓        AVIF inputs need the avif-decode build
  gif    -      -        256 colours, transparent areas become white
  bmp    -      -        transparent areas become white

At most 5 images are converted per invocation; extra inputs are dropped
with a warning. Inputs that are not images are skipped.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (for --smart-names)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Convert images between PNG, JPEG, WEBP, BMP, AVIF and GIF.
#[derive(Parser, Debug)]
#[command(
    name = "fchanger",
    version,
    about = "Convert up to five images to PNG, JPEG, WEBP, BMP, AVIF or GIF",
    long_about = "Re-encode local images or image URLs into another format. Transparent \
areas are flattened onto white for formats without alpha. Optionally asks a vision LLM \
for an SEO-friendly filename, alt text and description per image.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Target format: png, jpg, webp, bmp, avif, gif.
    #[arg(short, long, env = "FCHANGER_TO", default_value = "png", value_parser = parse_format)]
    to: SupportedFormat,

    /// Quality in [0.0, 1.0]. Used by JPEG and AVIF.
    #[arg(long, env = "FCHANGER_QUALITY", default_value_t = 1.0, allow_negative_numbers = true)]
    quality: f32,

    /// Directory for converted files.
    #[arg(short, long, env = "FCHANGER_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Ask a vision LLM for filenames (and alt text / descriptions in --json).
    #[arg(long, env = "FCHANGER_SMART_NAMES")]
    smart_names: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Images converted at once.
    #[arg(short, long, env = "FCHANGER_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// AVIF encoder speed, 1 (smallest files) to 10 (fastest).
    #[arg(long, env = "FCHANGER_AVIF_SPEED", default_value_t = 8,
          value_parser = clap::value_parser!(u8).range(1..=10))]
    avif_speed: u8,

    /// Print a JSON report on stdout.
    #[arg(long, env = "FCHANGER_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FCHANGER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FCHANGER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FCHANGER_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FCHANGER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "FCHANGER_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries per image on LLM failure, at most 10.
    #[arg(long, env = "FCHANGER_MAX_RETRIES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(0..=10))]
    max_retries: u32,
}

fn parse_format(s: &str) -> Result<SupportedFormat, String> {
    s.parse().map_err(|e: fchanger::ConvertError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are suppressed while the progress bar is active.
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

    // ── Validate options before touching any input ───────────────────────
    let options = ConversionOptions::new(cli.to, cli.quality);
    options.validate().context("Invalid --quality")?;

    // ── Load inputs ──────────────────────────────────────────────────────
    let (mut batch, notice) = load_batch(cli.inputs.as_slice(), cli.download_timeout)
        .await
        .context("Failed to load inputs")?;

    if !cli.quiet {
        for warning in notice.warnings() {
            eprintln!("{} {}", yellow("⚠"), warning);
        }
    }

    // ── Build configs ────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let enricher = if cli.smart_names {
        Some(build_enricher(&cli)?)
    } else {
        None
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let plan = batch
        .prepare_run(options, false)
        .context("Invalid conversion options")?;

    let outcome = match enricher {
        Some(ref enricher) => {
            let (outcome, failures) =
                tokio::join!(plan.execute(&config), batch.enrich_all(enricher));
            if !cli.quiet {
                for (id, err) in failures {
                    let name = batch.get(id).map(|i| i.name()).unwrap_or("?");
                    eprintln!("{} {}: {} (keeping original name)", yellow("⚠"), name, err);
                }
            }
            outcome
        }
        None => plan.execute(&config).await,
    };

    let report = batch.apply(outcome);

    // ── Write files ──────────────────────────────────────────────────────
    let written = write_artifacts(&batch, &cli.output_dir).context("Failed to write output")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &written, show_progress);
    }

    if report.stats.converted == 0 && report.stats.failed > 0 {
        anyhow::bail!("No image could be converted to {}", report.format);
    }

    Ok(())
}

/// Map CLI args to `ConverterConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .concurrency(cli.concurrency)
        .avif_speed(cli.avif_speed);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to an `LlmEnricher`.
fn build_enricher(cli: &Cli) -> Result<LlmEnricher> {
    let mut builder = EnrichmentConfig::builder()
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }

    let config = builder.build().context("Invalid enrichment configuration")?;
    LlmEnricher::from_config(config).context("--smart-names needs an LLM provider")
}

fn print_summary(report: &BatchReport, written: &[PathBuf], progress_shown: bool) {
    // The progress callback already printed per-item lines.
    if !progress_shown {
        for item in &report.items {
            match item.status {
                StatusKind::Success => eprintln!(
                    "  {} {} → {}  {}",
                    green("✓"),
                    item.name,
                    item.filename.as_deref().unwrap_or("?"),
                    dim(&format_file_size(item.output_bytes.unwrap_or(0) as u64)),
                ),
                StatusKind::Error => eprintln!(
                    "  {} {}  {}",
                    red("✗"),
                    item.name,
                    red(item.error.as_deref().unwrap_or("unknown error")),
                ),
                StatusKind::Idle | StatusKind::Converting => {}
            }
        }
    }

    eprintln!("{}", summary_line(&report.stats));
    for path in written {
        eprintln!("   {}", bold(&path.display().to_string()));
    }
}

fn summary_line(stats: &BatchStats) -> String {
    let attempted = stats.converted + stats.failed;
    let mark = if stats.failed == 0 {
        green("✔")
    } else if stats.converted == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    format!(
        "{}  {}/{} images  {} → {}  {}ms",
        mark,
        bold(&stats.converted.to_string()),
        attempted,
        dim(&format_file_size(stats.input_bytes)),
        dim(&format_file_size(stats.output_bytes)),
        stats.duration_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_complete_only_clears_the_bar() {
        let cb = CliProgressCallback::with_bar(ProgressBar::hidden());
        cb.on_batch_start(2);
        cb.on_item_complete(0, "a.png", 10);
        cb.on_batch_complete(2, 1);
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn summary_line_counts_attempted_items() {
        let stats = BatchStats {
            converted: 2,
            failed: 1,
            skipped: 4,
            input_bytes: 2048,
            output_bytes: 1024,
            duration_ms: 12,
            ..BatchStats::default()
        };
        let line = summary_line(&stats);
        assert!(line.contains("/3 images"), "{line}");
        assert!(line.contains("2 KB"), "{line}");
        assert!(line.contains("12ms"), "{line}");
        assert!(line.contains('⚠'), "{line}");
    }
}
