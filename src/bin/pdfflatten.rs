//! CLI binary for pdf-flatten.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `FlattenConfig` and writes the flattened document.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_flatten::convert::write_atomic;
use pdf_flatten::pipeline::input::{decode_base64_document, encode_base64_document, read_local};
use pdf_flatten::{
    flatten, FitMode, FlattenConfig, FlattenProgressCallback, ImageEncoding, PageSize,
    PipelineState, ProgressCallback, RasterEngine,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while rasterising, then a page bar while normalising.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl FlattenProgressCallback for CliProgressCallback {
    fn on_state(&self, state: PipelineState) {
        match state {
            PipelineState::WorkspaceAcquired => {
                self.bar.set_prefix("Rasterizing");
                self.bar.set_message("rendering pages…");
            }
            PipelineState::Normalized => {
                self.bar.set_prefix("Assembling");
                self.bar.set_message("writing PDF…");
            }
            PipelineState::Failed => self.bar.finish_and_clear(),
            _ => {}
        }
    }

    fn on_pages_rasterized(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Normalizing");
    }

    fn on_page_normalized(&self, _page_index: usize, _total_pages: usize) {
        self.bar.inc(1);
    }

    fn on_flatten_complete(&self, page_count: usize, output_bytes: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages flattened ({} bytes)",
            green("✔"),
            bold(&page_count.to_string()),
            output_bytes
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Flatten to a file
  pdfflatten form.pdf -o form.flat.pdf

  # Letter pages, stretched to fill, rendered at 200 DPI
  pdfflatten --page-size letter --fit exact --dpi 200 scan.pdf -o out.pdf

  # Base64 in, base64 out (same wrapping as the HTTP endpoint)
  pdfflatten --base64-in --base64-out payload.b64 > flat.b64

  # Use the in-process pdfium engine instead of pdftoppm
  pdfflatten --engine pdfium --pdfium-lib /opt/pdfium/lib doc.pdf -o flat.pdf

  # Run statistics as JSON
  pdfflatten --json doc.pdf -o flat.pdf > stats.json

ENVIRONMENT VARIABLES:
  Every flag has a PDFFLATTEN_* counterpart, e.g. PDFFLATTEN_DPI=200.
  RUST_LOG overrides the log filter.
"#;

/// Flatten PDFs into image-only PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdfflatten",
    version,
    about = "Flatten PDF documents into image-only PDFs",
    long_about = "Rasterise every page of a PDF, fit each image onto a fixed page canvas and \
rebuild a new PDF from the images. Text layers, forms, annotations and scripts do not survive.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to flatten (a base64 text file with --base64-in).
    input: PathBuf,

    /// Write the flattened PDF here instead of stdout.
    #[arg(short, long, env = "PDFFLATTEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Rasterisation engine: pdftoppm or pdfium.
    #[arg(long, env = "PDFFLATTEN_ENGINE", default_value = "pdftoppm")]
    engine: RasterEngine,

    /// Rendering resolution in DPI (engine default when unset).
    #[arg(long, env = "PDFFLATTEN_DPI",
          value_parser = clap::value_parser!(u32).range(36..=1200))]
    dpi: Option<u32>,

    /// Pixels per inch when placing images (72 = one pixel per point).
    #[arg(long, env = "PDFFLATTEN_EMBED_DPI", default_value_t = 72,
          value_parser = clap::value_parser!(u32).range(36..=1200))]
    embed_dpi: u32,

    /// Page canvas: a4, letter, or WxH in points (e.g. 595x842).
    #[arg(long, env = "PDFFLATTEN_PAGE_SIZE", default_value = "a4")]
    page_size: PageSize,

    /// Placement: contain (centered, aspect kept) or exact (fill the page).
    #[arg(long, env = "PDFFLATTEN_FIT", default_value = "contain")]
    fit: FitMode,

    /// Embedded image format: png or jpeg.
    #[arg(long, env = "PDFFLATTEN_FORMAT", default_value = "png")]
    format: ImageEncoding,

    /// JPEG quality (1–100).
    #[arg(long, env = "PDFFLATTEN_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Pages normalised in parallel (defaults to the number of CPUs).
    #[arg(short, long, env = "PDFFLATTEN_CONCURRENCY")]
    concurrency: Option<usize>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFFLATTEN_PASSWORD")]
    password: Option<String>,

    /// Rasteriser timeout in seconds.
    #[arg(long, env = "PDFFLATTEN_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// pdftoppm executable.
    #[arg(long, env = "PDFFLATTEN_PDFTOPPM", default_value = "pdftoppm")]
    pdftoppm: PathBuf,

    /// Directory or file of the pdfium shared library.
    #[arg(long, env = "PDFFLATTEN_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Longest edge of a pdfium-rendered page, in pixels.
    #[arg(long, env = "PDFFLATTEN_MAX_PIXELS", default_value_t = 6000)]
    max_pixels: u32,

    /// Input file holds base64 text instead of PDF bytes.
    #[arg(long, env = "PDFFLATTEN_BASE64_IN")]
    base64_in: bool,

    /// Write the result as base64 text.
    #[arg(long, env = "PDFFLATTEN_BASE64_OUT")]
    base64_out: bool,

    /// Print run statistics as JSON on stdout (requires --output).
    #[arg(long, env = "PDFFLATTEN_JSON", requires = "output")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFFLATTEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFFLATTEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFFLATTEN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is set.
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
        Some(CliProgressCallback::new() as Arc<dyn FlattenProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Read input ───────────────────────────────────────────────────────
    let document = if cli.base64_in {
        let text = tokio::fs::read_to_string(&cli.input)
            .await
            .with_context(|| format!("Failed to read {}", cli.input.display()))?;
        decode_base64_document(&text).context("Failed to decode base64 input")?
    } else {
        read_local(&cli.input).await.context("Failed to read input")?
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let output = match flatten(&document, &config).await {
        Ok(output) => output,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), e);
            }
            return Err(e).context("Flatten failed");
        }
    };

    let bytes = if cli.base64_out {
        encode_base64_document(&output.pdf).into_bytes()
    } else {
        output.pdf.clone()
    };

    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, &bytes)
            .await
            .context("Failed to write output")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else if !cli.quiet {
            eprintln!(
                "{}  {} pages  {}ms  →  {}",
                green("✔"),
                output.stats.page_count,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&bytes)
            .context("Failed to write to stdout")?;
        handle.flush().context("Failed to flush stdout")?;
    }

    Ok(())
}

/// Map CLI args to `FlattenConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<FlattenConfig> {
    let mut builder = FlattenConfig::builder()
        .engine(cli.engine)
        .embed_dpi(cli.embed_dpi)
        .page_size(cli.page_size)
        .fit(cli.fit)
        .encoding(cli.format)
        .jpeg_quality(cli.quality)
        .raster_timeout_secs(cli.timeout)
        .pdftoppm_path(&cli.pdftoppm);

    if let Some(dpi) = cli.dpi {
        builder = builder.resolution(dpi);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    builder = builder.max_rendered_pixels(cli.max_pixels);
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
