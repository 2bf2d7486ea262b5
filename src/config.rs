//! Configuration types for PDF flattening.
//!
//! All pipeline behaviour is controlled through [`FlattenConfig`], built via
//! its [`FlattenConfigBuilder`]. Resolution, placement and encode quality
//! differ between deployments, so each of them is a field with a documented
//! default rather than a constant buried in a stage.

use crate::error::FlattenError;
use crate::pipeline::rasterize::Rasterizer;
use crate::pipeline::render::DEFAULT_MAX_RENDERED_PIXELS;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a flatten run.
///
/// Built via [`FlattenConfig::builder()`] or using
/// [`FlattenConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_flatten::{FitMode, FlattenConfig, PageSize};
///
/// let config = FlattenConfig::builder()
///     .resolution(300)
///     .page_size(PageSize::LETTER)
///     .fit(FitMode::Exact)
///     .build()
///     .unwrap();
/// assert_eq!(config.resolution, Some(300));
/// ```
#[derive(Clone)]
pub struct FlattenConfig {
    /// Rasterisation engine used when no `rasterizer` is injected. Default: pdftoppm.
    pub engine: RasterEngine,

    /// Pre-constructed rasteriser. Takes precedence over `engine`.
    pub rasterizer: Option<Arc<dyn Rasterizer>>,

    /// Rasterisation DPI. `None` keeps the engine's own default
    /// (pdftoppm: 150, pdfium: 150). Range: 36–1200.
    pub resolution: Option<u32>,

    /// Output page canvas. Default: A4 (595 × 842 pt).
    pub page_size: PageSize,

    /// Pixel density of embedded images. Default: 72 (one pixel per point).
    ///
    /// The normaliser's target box is `page_size × embed_dpi / 72` pixels, so
    /// raising this keeps more of a high-DPI raster while the page stays the
    /// same physical size.
    pub embed_dpi: u32,

    /// How each page image is fitted onto the canvas. Default: [`FitMode::Contain`].
    pub fit: FitMode,

    /// Raster format embedded in the output. Default: PNG.
    pub encoding: ImageEncoding,

    /// JPEG quality when `encoding` is JPEG. Range 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Pages normalised in parallel. Default: number of CPUs (min 1).
    pub concurrency: usize,

    /// Upper bound on one rasteriser invocation, in seconds. Default: 120.
    pub raster_timeout_secs: u64,

    /// pdftoppm executable. Default: `pdftoppm` from `PATH`.
    pub pdftoppm_path: PathBuf,

    /// Arguments inserted before the pdftoppm arguments, for wrappers such as
    /// `nice` or a shell interpreter. Default: empty.
    pub pdftoppm_args: Vec<String>,

    /// pdfium shared library location. `None` tries `./` then the system path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Longest edge, in pixels, of a page rendered by pdfium. Bounds memory
    /// for large pages at high DPI. Minimum 100. Default: 6000.
    pub max_rendered_pixels: u32,

    /// User password for encrypted input documents.
    pub password: Option<String>,

    /// Parent directory for per-request workspaces. `None` uses the system temp dir.
    pub workspace_root: Option<PathBuf>,

    /// Title written into the output document. Default: "Flattened document".
    pub title: String,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            engine: RasterEngine::default(),
            rasterizer: None,
            resolution: None,
            page_size: PageSize::A4,
            embed_dpi: 72,
            fit: FitMode::default(),
            encoding: ImageEncoding::default(),
            jpeg_quality: 90,
            concurrency: default_concurrency(),
            raster_timeout_secs: 120,
            pdftoppm_path: PathBuf::from("pdftoppm"),
            pdftoppm_args: Vec::new(),
            pdfium_library_path: None,
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
            password: None,
            workspace_root: None,
            title: "Flattened document".to_string(),
            progress_callback: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl fmt::Debug for FlattenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenConfig")
            .field("engine", &self.engine)
            .field(
                "rasterizer",
                &self.rasterizer.as_ref().map(|r| r.name()),
            )
            .field("resolution", &self.resolution)
            .field("page_size", &self.page_size)
            .field("embed_dpi", &self.embed_dpi)
            .field("fit", &self.fit)
            .field("encoding", &self.encoding)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("concurrency", &self.concurrency)
            .field("raster_timeout_secs", &self.raster_timeout_secs)
            .field("pdftoppm_path", &self.pdftoppm_path)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("workspace_root", &self.workspace_root)
            .field("title", &self.title)
            .finish()
    }
}

impl FlattenConfig {
    /// Create a new builder for `FlattenConfig`.
    pub fn builder() -> FlattenConfigBuilder {
        FlattenConfigBuilder {
            config: Self::default(),
        }
    }

    /// Bound on a single rasteriser invocation.
    pub fn raster_timeout(&self) -> Duration {
        Duration::from_secs(self.raster_timeout_secs)
    }

    /// Pixel box the normaliser fits each page image into.
    pub fn target_pixels(&self) -> (u32, u32) {
        self.page_size.to_pixels(self.embed_dpi)
    }
}

/// Builder for [`FlattenConfig`].
pub struct FlattenConfigBuilder {
    config: FlattenConfig,
}

impl fmt::Debug for FlattenConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl FlattenConfigBuilder {
    pub fn engine(mut self, engine: RasterEngine) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn resolution(mut self, dpi: u32) -> Self {
        self.config.resolution = Some(dpi);
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn embed_dpi(mut self, dpi: u32) -> Self {
        self.config.embed_dpi = dpi;
        self
    }

    pub fn fit(mut self, fit: FitMode) -> Self {
        self.config.fit = fit;
        self
    }

    pub fn encoding(mut self, encoding: ImageEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn raster_timeout_secs(mut self, secs: u64) -> Self {
        self.config.raster_timeout_secs = secs;
        self
    }

    pub fn pdftoppm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftoppm_path = path.into();
        self
    }

    pub fn pdftoppm_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.pdftoppm_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = Some(root.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FlattenConfig, FlattenError> {
        let c = &self.config;
        if let Some(dpi) = c.resolution {
            if !(36..=1200).contains(&dpi) {
                return Err(FlattenError::InvalidConfig(format!(
                    "resolution must be 36–1200 DPI, got {dpi}"
                )));
            }
        }
        if !(36..=1200).contains(&c.embed_dpi) {
            return Err(FlattenError::InvalidConfig(format!(
                "embed DPI must be 36–1200, got {}",
                c.embed_dpi
            )));
        }
        if !c.page_size.is_valid() {
            return Err(FlattenError::InvalidConfig(format!(
                "page size must be positive, got {}",
                c.page_size
            )));
        }
        if c.raster_timeout_secs == 0 {
            return Err(FlattenError::InvalidConfig(
                "rasterization timeout must be at least 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(FlattenError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which rasteriser turns input pages into images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterEngine {
    /// `pdftoppm` subprocess writing PNGs into the request workspace (default).
    #[default]
    Pdftoppm,
    /// pdfium shared library, rendering in-process.
    Pdfium,
}

impl FromStr for RasterEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdftoppm" | "poppler" => Ok(Self::Pdftoppm),
            "pdfium" => Ok(Self::Pdfium),
            other => Err(format!("unknown engine '{other}' (expected pdftoppm or pdfium)")),
        }
    }
}

/// How a page image is fitted onto the output canvas.
///
/// | Mode | Resize | Placement |
/// |------|--------|-----------|
/// | `Contain` | fit inside, keep aspect ratio, never upscale | centered |
/// | `Exact` | stretch to the full target box | `x = y = 0` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Contain,
    Exact,
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contain" | "center" | "inside" => Ok(Self::Contain),
            "exact" | "fill" | "stretch" => Ok(Self::Exact),
            other => Err(format!("unknown fit mode '{other}' (expected contain or exact)")),
        }
    }
}

/// Raster encoding embedded into the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    /// Lossless. Default.
    #[default]
    Png,
    /// Lossy, quality from [`FlattenConfig::jpeg_quality`].
    Jpeg,
}

impl FromStr for ImageEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            other => Err(format!("unknown image format '{other}' (expected png or jpeg)")),
        }
    }
}

/// Output page canvas in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// ISO A4, rounded to whole points.
    pub const A4: PageSize = PageSize::new(595.0, 842.0);
    /// US Letter.
    pub const LETTER: PageSize = PageSize::new(612.0, 792.0);

    pub const fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
        }
    }

    fn is_valid(&self) -> bool {
        self.width_pt.is_finite()
            && self.height_pt.is_finite()
            && self.width_pt > 0.0
            && self.height_pt > 0.0
    }

    /// Pixel box covering the page at `dpi`.
    pub fn to_pixels(&self, dpi: u32) -> (u32, u32) {
        let scale = dpi as f32 / 72.0;
        (
            ((self.width_pt * scale).round() as u32).max(1),
            ((self.height_pt * scale).round() as u32).max(1),
        )
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}pt", self.width_pt, self.height_pt)
    }
}

impl FromStr for PageSize {
    type Err = String;

    /// Accepts `a4`, `letter`, or `WIDTHxHEIGHT` in points.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "a4" => return Ok(Self::A4),
            "letter" => return Ok(Self::LETTER),
            _ => {}
        }
        let (w, h) = s
            .trim_end_matches("pt")
            .split_once('x')
            .ok_or_else(|| format!("invalid page size '{s}' (expected a4, letter or WxH)"))?;
        let w: f32 = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid page width '{w}'"))?;
        let h: f32 = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid page height '{h}'"))?;
        let size = Self::new(w, h);
        if !size.is_valid() {
            return Err(format!("page size must be positive, got '{s}'"));
        }
        Ok(size)
    }
}
