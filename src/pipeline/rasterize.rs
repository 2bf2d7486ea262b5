//! Rasterisation: turn a PDF byte blob into an ordered set of page images.
//!
//! [`Rasterizer`] is the seam between the pipeline and whatever actually
//! draws pages. Two implementations ship with the crate:
//!
//! * [`PdftoppmRasterizer`]: runs poppler's `pdftoppm` as a subprocess
//!   and reads the PNGs it leaves in the request [`Workspace`].
//! * [`crate::pipeline::render::PdfiumRasterizer`]: renders in-process
//!   through pdfium and never touches the workspace.
//!
//! ## Page order
//!
//! `pdftoppm` names its output `page-1.png … page-10.png` (zero-padded only
//! for some page counts). Directory listings and string sorts put `page-10`
//! before `page-2`, so [`order_page_files`] sorts on the numeric value of the
//! last digit run in each name and rejects sequences with gaps or duplicates.

use crate::error::FlattenError;
use crate::pipeline::render::DEFAULT_MAX_RENDERED_PIXELS;
use crate::pipeline::workspace::Workspace;
use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File name of the input document inside the workspace.
pub const INPUT_FILE_NAME: &str = "input.pdf";

/// Output prefix handed to `pdftoppm`.
pub const PAGE_FILE_PREFIX: &str = "page";

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based position in the source document.
    pub index: usize,
    pub source: PageSource,
}

/// Where a page's pixels live.
#[derive(Debug, Clone)]
pub enum PageSource {
    /// An image file inside the request workspace.
    File(PathBuf),
    /// Pixels already decoded in memory.
    Decoded(DynamicImage),
}

/// Per-call rasterisation parameters.
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// DPI override; `None` keeps the engine default.
    pub resolution: Option<u32>,
    /// User password for encrypted documents.
    pub password: Option<String>,
    /// Upper bound on the whole rasterisation.
    pub timeout: Duration,
    /// Longest rendered edge in pixels, for engines that render in-process.
    pub max_rendered_pixels: u32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            resolution: None,
            password: None,
            timeout: Duration::from_secs(120),
            max_rendered_pixels: DEFAULT_MAX_RENDERED_PIXELS,
        }
    }
}

/// Rasterisation capability.
///
/// Implementations must return pages sorted by `index`, with indices
/// `0..n` and `n ≥ 1`; the orchestrator verifies this before assembly.
/// Any files they create must live under `workspace`.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Short identifier used in logs and stats.
    fn name(&self) -> &'static str;

    async fn rasterize(
        &self,
        document: &[u8],
        workspace: &Workspace,
        options: &RasterOptions,
    ) -> Result<Vec<PageImage>, FlattenError>;
}

// ── pdftoppm ─────────────────────────────────────────────────────────────

/// Rasteriser backed by the `pdftoppm` command-line tool.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the pdftoppm arguments (wrapper invocations).
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, input: &Path, output_prefix: &Path, options: &RasterOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args).arg("-png");
        if let Some(dpi) = options.resolution {
            cmd.arg("-r").arg(dpi.to_string());
        }
        if let Some(ref pwd) = options.password {
            cmd.arg("-upw").arg(pwd);
        }
        cmd.arg(input)
            .arg(output_prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    async fn rasterize(
        &self,
        document: &[u8],
        workspace: &Workspace,
        options: &RasterOptions,
    ) -> Result<Vec<PageImage>, FlattenError> {
        let input = workspace.join(INPUT_FILE_NAME);
        tokio::fs::write(&input, document)
            .await
            .map_err(|e| FlattenError::rasterization(format!("failed to stage input: {e}")))?;

        let prefix = workspace.join(PAGE_FILE_PREFIX);
        let mut cmd = self.command(&input, &prefix, options);
        debug!(
            "Running {} (resolution: {:?})",
            self.program.display(),
            options.resolution
        );

        let child = cmd.spawn().map_err(|e| {
            FlattenError::rasterization(format!(
                "failed to start {}: {e}",
                self.program.display()
            ))
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                FlattenError::rasterization(format!("failed to wait for rasterizer: {e}"))
            })?,
            Err(_) => {
                warn!(
                    "{} exceeded {}s, killed",
                    self.program.display(),
                    options.timeout.as_secs()
                );
                return Err(FlattenError::RasterizationTimeout {
                    secs: options.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(FlattenError::rasterization(format!(
                "{} exited with status {}: {}",
                self.name(),
                code,
                workspace.redact(stderr.trim())
            )));
        }

        let files = collect_page_files(workspace.path()).await?;
        if files.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FlattenError::rasterization(format!(
                "{} produced no page images{}",
                self.name(),
                if stderr.trim().is_empty() {
                    String::new()
                } else {
                    format!(": {}", workspace.redact(stderr.trim()))
                }
            )));
        }

        let pages = order_page_files(files)?;
        info!("Rasterized {} pages with {}", pages.len(), self.name());
        Ok(pages)
    }
}

/// List `page*.png` files in `dir`, in whatever order the OS returns them.
pub async fn collect_page_files(dir: &Path) -> Result<Vec<PathBuf>, FlattenError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| FlattenError::rasterization(format!("failed to list page images: {e}")))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FlattenError::rasterization(format!("failed to list page images: {e}")))?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(PAGE_FILE_PREFIX) && name.to_ascii_lowercase().ends_with(".png") {
            files.push(entry.path());
        }
    }
    Ok(files)
}

static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\D*$").unwrap());

/// Numeric page number embedded in a file name (last run of digits in the stem).
pub fn page_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_string_lossy();
    RE_PAGE_NUMBER
        .captures(&stem)
        .and_then(|caps| caps[1].parse().ok())
}

/// Sort rasteriser output by embedded page number and assign 0-based indices.
///
/// Page numbers are 1-based and must run `1..=n` without gaps, so
/// `page-1 … page-10` become indices 0 … 9 regardless of listing order.
/// Fails if a name carries no number, if two files claim the same page, or
/// if a page is missing.
pub fn order_page_files(files: Vec<PathBuf>) -> Result<Vec<PageImage>, FlattenError> {
    let mut numbered = Vec::with_capacity(files.len());
    for path in files {
        let number = page_number(&path).ok_or_else(|| {
            FlattenError::rasterization(format!(
                "page image '{}' has no page number",
                file_label(&path)
            ))
        })?;
        numbered.push((number, path));
    }

    numbered.sort_by_key(|(number, _)| *number);

    if let Some(&(first, _)) = numbered.first() {
        if first != 1 {
            return Err(FlattenError::rasterization(format!(
                "page images start at page {first}, expected page 1"
            )));
        }
    }
    for pair in numbered.windows(2) {
        let (prev, next) = (pair[0].0, pair[1].0);
        if next == prev {
            return Err(FlattenError::rasterization(format!(
                "duplicate page number {next}"
            )));
        }
        if next != prev + 1 {
            return Err(FlattenError::rasterization(format!(
                "missing page images between page {prev} and page {next}"
            )));
        }
    }

    Ok(numbered
        .into_iter()
        .enumerate()
        .map(|(index, (_, path))| PageImage {
            index,
            source: PageSource::File(path),
        })
        .collect())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
