//! # pdf-flatten
//!
//! Flatten PDF documents into image-only PDFs.
//!
//! Every page is rasterised, fitted onto a fixed page canvas and re-embedded
//! as a single image. The result keeps the look of the original and drops
//! everything else: text layers, form fields, annotations, scripts and
//! embedded files.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input      %PDF check, optional base64 transport unwrap
//!  ├─ 2. Workspace  unique scratch directory per request
//!  ├─ 3. Rasterize  pdftoppm subprocess (default) or in-process pdfium
//!  ├─ 4. Normalize  fit-inside resize + PNG/JPEG re-encode (parallel)
//!  ├─ 5. Assemble   one fixed-size page per image, in page order
//!  └─ 6. Release    workspace removed on success and on failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_flatten::{flatten, FitMode, FlattenConfig, PageSize};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FlattenConfig::builder()
//!         .page_size(PageSize::A4)
//!         .fit(FitMode::Contain)
//!         .resolution(150)
//!         .build()?;
//!     let input = std::fs::read("form.pdf")?;
//!     let output = flatten(&input, &config).await?;
//!     std::fs::write("form.flat.pdf", &output.pdf)?;
//!     eprintln!("{} pages in {}ms", output.stats.page_count, output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdfflatten` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `server` | on      | Enables [`server`] and the `pdfflatten-server` binary (axum + tower-http) |
//!
//! Library-only use:
//! ```toml
//! pdf-flatten = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FitMode, FlattenConfig, FlattenConfigBuilder, ImageEncoding, PageSize, RasterEngine,
};
pub use convert::{
    flatten, flatten_base64, flatten_file, flatten_sync, flatten_to_file, flatten_with,
    PipelineState,
};
pub use error::{ErrorCategory, FlattenError};
pub use output::{FlattenOutput, FlattenStats, PageSummary};
pub use pipeline::assemble::Placement;
pub use pipeline::rasterize::{PageImage, PageSource, PdftoppmRasterizer, RasterOptions, Rasterizer};
pub use pipeline::render::PdfiumRasterizer;
pub use pipeline::workspace::Workspace;
pub use progress::{FlattenProgressCallback, NoopProgressCallback, ProgressCallback};
