//! HTTP server binary for pdf-flatten.
//!
//! Serves `POST /api/convertPdf` with one shared, immutable `FlattenConfig`.

use anyhow::{Context, Result};
use clap::Parser;
use pdf_flatten::server::{serve, AppState};
use pdf_flatten::{FitMode, FlattenConfig, ImageEncoding, PageSize, RasterEngine};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Serve the flatten pipeline over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "pdfflatten-server",
    version,
    about = "HTTP service: POST a base64 PDF to /api/convertPdf, get a flattened PDF back"
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "PDFFLATTEN_BIND", default_value = "0.0.0.0:8001")]
    bind: SocketAddr,

    /// Maximum request body in MiB.
    #[arg(long, env = "PDFFLATTEN_BODY_LIMIT_MB", default_value_t = 50)]
    body_limit_mb: usize,

    /// Rasterisation engine: pdftoppm or pdfium.
    #[arg(long, env = "PDFFLATTEN_ENGINE", default_value = "pdftoppm")]
    engine: RasterEngine,

    /// Rendering resolution in DPI (engine default when unset).
    #[arg(long, env = "PDFFLATTEN_DPI",
          value_parser = clap::value_parser!(u32).range(36..=1200))]
    dpi: Option<u32>,

    /// Page canvas: a4, letter, or WxH in points.
    #[arg(long, env = "PDFFLATTEN_PAGE_SIZE", default_value = "a4")]
    page_size: PageSize,

    /// Placement: contain or exact.
    #[arg(long, env = "PDFFLATTEN_FIT", default_value = "contain")]
    fit: FitMode,

    /// Embedded image format: png or jpeg.
    #[arg(long, env = "PDFFLATTEN_FORMAT", default_value = "png")]
    format: ImageEncoding,

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

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFFLATTEN_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mut builder = FlattenConfig::builder()
        .engine(cli.engine)
        .page_size(cli.page_size)
        .fit(cli.fit)
        .encoding(cli.format)
        .raster_timeout_secs(cli.timeout)
        .pdftoppm_path(&cli.pdftoppm);
    if let Some(dpi) = cli.dpi {
        builder = builder.resolution(dpi);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    builder = builder.max_rendered_pixels(cli.max_pixels);
    let config = builder.build().context("Invalid configuration")?;
    tracing::info!(?config, "Starting pdf-flatten server");

    let body_limit = cli.body_limit_mb.saturating_mul(1024 * 1024);
    serve(cli.bind, AppState::new(config), body_limit)
        .await
        .context("Server failed")?;
    Ok(())
}
