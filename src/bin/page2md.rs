//! CLI binary for page2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use page2md::{
    convert, convert_to_dir, ConversionConfig, ConversionProgressCallback, ProgressCallback, Stage,
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while the page is converted, then a
/// bar over the image downloads.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Converting");
        bar.set_message("Loading page…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Saving");
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        match stage {
            Stage::Failed => self.bar.finish_and_clear(),
            Stage::Done => {}
            other => self.bar.set_message(other.as_str().replace('-', " ")),
        }
    }

    fn on_frames_captured(&self, captured: usize, contacted: usize) {
        if contacted > 0 {
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                dim(&format!("{captured}/{contacted} frames captured"))
            ));
        }
    }

    fn on_download_start(&self, total: usize) {
        self.activate_bar(total);
    }

    fn on_image_complete(&self, local_name: &str) {
        self.bar.println(format!("  {} {}", green("✓"), dim(local_name)));
        self.bar.inc(1);
    }

    fn on_image_error(&self, url: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), url, red(&msg)));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, images: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} images saved", green("✔"), bold(&images.to_string()));
        } else {
            eprintln!(
                "{} {} images saved  ({} failed)",
                cyan("⚠"),
                bold(&images.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Article + images into the current directory
  page2md https://example.com/post

  # Into a clippings folder
  page2md https://example.com/post -o ~/clippings

  # A saved page, resolving relative links against its live URL
  page2md saved.html --base-url https://example.com/post

  # Markdown on stdout only (no downloads)
  page2md --stdout https://example.com/post

  # Structured output (markdown, metadata, image map, warnings)
  page2md --json https://example.com/post > post.json

OUTPUT LAYOUT:
  <DIR>/<title>.md          the article
  <DIR>/<title>/<name>      its images; charts are saved as PNG

ENVIRONMENT VARIABLES:
  Every flag can be set with PAGE2MD_<FLAG>, e.g. PAGE2MD_FRAME_TIMEOUT=8000.
  RUST_LOG overrides the log filter.
"#;

/// Convert web pages to Markdown with locally saved images.
#[derive(Parser, Debug)]
#[command(
    name = "page2md",
    version,
    about = "Convert web pages to Markdown with locally saved images and rasterised charts",
    long_about = "Convert a web page (local HTML file or URL) to clean Markdown. The main article \
is extracted, charts drawn as SVG (including those inside embedded frames) are rasterised to PNG, \
and every image is saved in a folder next to the Markdown file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local HTML file path or HTTP/HTTPS URL.
    input: String,

    /// Directory to write `<title>.md` and the image folder into.
    #[arg(short, long, env = "PAGE2MD_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Resolve relative links against this URL instead of the input location.
    #[arg(long, env = "PAGE2MD_BASE_URL")]
    base_url: Option<String>,

    /// Print Markdown to stdout; nothing is written to disk.
    #[arg(long, env = "PAGE2MD_STDOUT")]
    stdout: bool,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "PAGE2MD_JSON")]
    json: bool,

    /// Do not capture charts from embedded frames.
    #[arg(long, env = "PAGE2MD_NO_FRAMES")]
    no_frames: bool,

    /// Do not rasterise SVG; vector drawings are dropped.
    #[arg(long, env = "PAGE2MD_NO_SVG")]
    no_svg: bool,

    /// How long to wait for frame responses, in milliseconds.
    #[arg(long, env = "PAGE2MD_FRAME_TIMEOUT", default_value_t = 5000)]
    frame_timeout: u64,

    /// Number of concurrent rasterisations and downloads.
    #[arg(short, long, env = "PAGE2MD_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// HTTP fetch timeout in seconds.
    #[arg(long, env = "PAGE2MD_FETCH_TIMEOUT", default_value_t = 60)]
    fetch_timeout: u64,

    /// Minimum article length before extraction relaxes its heuristics.
    #[arg(long, env = "PAGE2MD_CHAR_THRESHOLD", default_value_t = 500)]
    char_threshold: usize,

    /// Omit the YAML front matter.
    #[arg(long, env = "PAGE2MD_NO_FRONTMATTER")]
    no_frontmatter: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAGE2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAGE2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAGE2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.stdout;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Markdown / JSON only ─────────────────────────────────────────────
    if cli.stdout || cli.json {
        let output = convert(&cli.input, &config).await.context("Conversion failed")?;
        if cli.json {
            let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markdown.as_bytes())
                .context("Failed to write to stdout")?;
        }
        for w in &output.warnings {
            if !cli.quiet {
                eprintln!("{} {}", cyan("⚠"), w);
            }
        }
        return Ok(());
    }

    // ── Convert and dispatch ─────────────────────────────────────────────
    let (output, report) = convert_to_dir(&cli.input, &cli.output, &config)
        .await
        .context("Conversion failed")?;

    if !cli.quiet {
        for w in &output.warnings {
            eprintln!("{} {}", cyan("⚠"), w);
        }
        if !show_progress {
            for f in &report.failed {
                eprintln!("{} {}", red("✗"), f);
            }
        }
        eprintln!(
            "{}  {}  {}/{} images  {} charts  {}ms",
            if report.is_complete() { green("✔") } else { cyan("⚠") },
            bold(&report.markdown_path.display().to_string()),
            report.saved.len(),
            report.saved.len() + report.failed.len(),
            output.stats.charts_rasterized,
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .capture_frames(!cli.no_frames)
        .capture_svg(!cli.no_svg)
        .frame_timeout_ms(cli.frame_timeout)
        .concurrency(cli.concurrency)
        .fetch_timeout_secs(cli.fetch_timeout)
        .char_threshold(cli.char_threshold)
        .include_frontmatter(!cli.no_frontmatter);

    if let Some(ref base) = cli.base_url {
        builder = builder.base_url(base.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_config() {
        let cli = Cli::parse_from([
            "page2md",
            "page.html",
            "--no-frames",
            "--frame-timeout",
            "1500",
            "--char-threshold",
            "200",
            "--base-url",
            "https://example.com/a",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert!(!config.capture_frames);
        assert!(config.capture_svg);
        assert_eq!(config.frame_timeout_ms, 1500);
        assert_eq!(config.char_threshold, 200);
        assert_eq!(config.base_url.as_deref(), Some("https://example.com/a"));
        assert_eq!(cli.output, PathBuf::from("."));
    }
}
