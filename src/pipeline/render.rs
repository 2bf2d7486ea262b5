//! In-process rasterisation via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. `tokio::task::spawn_blocking`
//! moves the work onto the blocking pool so runtime worker threads never
//! stall while a page is drawn.
//!
//! Pages come back as decoded images, so this rasteriser needs no scratch
//! files and leaves the request workspace untouched.
//!
//! ## Pixel cap
//!
//! A poster-sized page at 1200 DPI would decode to hundreds of megapixels.
//! The render scale is the smaller of `dpi / 72` and the scale that puts the
//! page's longest edge at `max_rendered_pixels`, so memory stays bounded
//! whatever the physical page size.

use crate::error::FlattenError;
use crate::pipeline::rasterize::{PageImage, PageSource, RasterOptions, Rasterizer};
use crate::pipeline::workspace::Workspace;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// DPI used when the caller does not choose one.
pub const DEFAULT_PDFIUM_DPI: u32 = 150;

/// Longest rendered edge, in pixels, when the caller does not choose one.
pub const DEFAULT_MAX_RENDERED_PIXELS: u32 = 6000;

/// Scale factor from points to pixels for a `width × height` pt page.
pub fn render_scale(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> f32 {
    let scale = dpi as f32 / 72.0;
    let longest = width_pt.max(height_pt);
    if longest <= 0.0 {
        return scale;
    }
    scale.min(max_pixels as f32 / longest)
}

/// Rasteriser backed by a dynamically bound pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Bind from `./` or the system library path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind from the directory (or file) at `path`.
    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, FlattenError> {
        let bindings = match self.library_path {
            Some(ref path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(ref path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| FlattenError::rasterization(format!("failed to bind pdfium: {e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn rasterize(
        &self,
        document: &[u8],
        _workspace: &Workspace,
        options: &RasterOptions,
    ) -> Result<Vec<PageImage>, FlattenError> {
        let this = self.clone();
        let bytes = document.to_vec();
        let dpi = options.resolution.unwrap_or(DEFAULT_PDFIUM_DPI);
        let password = options.password.clone();
        let max_pixels = options.max_rendered_pixels;

        let task = tokio::task::spawn_blocking(move || {
            this.render_blocking(&bytes, dpi, max_pixels, password.as_deref())
        });

        match tokio::time::timeout(options.timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| FlattenError::Internal(format!("Render task panicked: {e}")))?,
            // The blocking thread cannot be interrupted; its result is discarded.
            Err(_) => Err(FlattenError::RasterizationTimeout {
                secs: options.timeout.as_secs(),
            }),
        }
    }
}

impl PdfiumRasterizer {
    fn render_blocking(
        &self,
        bytes: &[u8],
        dpi: u32,
        max_pixels: u32,
        password: Option<&str>,
    ) -> Result<Vec<PageImage>, FlattenError> {
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    FlattenError::rasterization("wrong password for encrypted document")
                } else {
                    FlattenError::rasterization("document is encrypted and requires a password")
                }
            } else {
                FlattenError::rasterization(format!("cannot open document: {err_str}"))
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let mut results = Vec::with_capacity(total_pages);
        for (index, page) in pages.iter().enumerate() {
            let scale = render_scale(page.width().value, page.height().value, dpi, max_pixels);
            if scale < dpi as f32 / 72.0 {
                debug!("Page {} capped at {} px on the long edge", index + 1, max_pixels);
            }
            let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                FlattenError::rasterization(format!("page {}: {:?}", index + 1, e))
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                index + 1,
                image.width(),
                image.height()
            );

            results.push(PageImage {
                index,
                source: PageSource::Decoded(image),
            });
        }

        Ok(results)
    }
}
