//! Pipeline orchestration and the public flatten entry points.
//!
//! A run moves through [`PipelineState`]:
//!
//! ```text
//! Idle ─▶ WorkspaceAcquired ─▶ Rasterized ─▶ Normalized ─▶ Assembled ─▶ Done
//!   └──────────────┴───────────────┴──────────────┴─────────────┴──▶ Failed
//! ```
//!
//! The first failing stage short-circuits the rest. Whatever happens after
//! the workspace is acquired, it is released before the call returns.

use crate::config::{FlattenConfig, RasterEngine};
use crate::error::FlattenError;
use crate::output::{FlattenOutput, FlattenStats, PageSummary};
use crate::pipeline::assemble::{assemble, placement_for, PlacedImage};
use crate::pipeline::input;
use crate::pipeline::normalize::{normalize, NormalizeOptions, NormalizedImage};
use crate::pipeline::rasterize::{PageImage, PdftoppmRasterizer, RasterOptions, Rasterizer};
use crate::pipeline::render::PdfiumRasterizer;
use crate::pipeline::workspace::Workspace;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Orchestrator state. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    WorkspaceAcquired,
    Rasterized,
    Normalized,
    Assembled,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::WorkspaceAcquired => "workspace acquired",
            Self::Rasterized => "rasterized",
            Self::Normalized => "normalized",
            Self::Assembled => "assembled",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks the current state of one run and reports transitions.
struct Run<'a> {
    state: PipelineState,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> Run<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            state: PipelineState::Idle,
            callback,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state");
        debug!("Pipeline: {} → {}", self.state, next);
        self.state = next;
        if let Some(cb) = self.callback {
            cb.on_state(next);
        }
    }

    fn fail(&mut self, error: &FlattenError) {
        warn!("Pipeline failed after '{}': {}", self.state, error);
        self.advance(PipelineState::Failed);
    }
}

/// Flatten a PDF held in memory.
///
/// Uses `config.rasterizer` when set, otherwise the engine named by
/// `config.engine`.
///
/// # Example
/// ```rust,no_run
/// use pdf_flatten::{flatten, FlattenConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.pdf")?;
/// let output = flatten(&bytes, &FlattenConfig::default()).await?;
/// std::fs::write("flat.pdf", &output.pdf)?;
/// println!("{} pages", output.stats.page_count);
/// # Ok(())
/// # }
/// ```
pub async fn flatten(
    document: &[u8],
    config: &FlattenConfig,
) -> Result<FlattenOutput, FlattenError> {
    let rasterizer = resolve_rasterizer(config);
    flatten_with(rasterizer.as_ref(), document, config).await
}

/// Flatten a PDF with an explicit rasteriser.
pub async fn flatten_with(
    rasterizer: &dyn Rasterizer,
    document: &[u8],
    config: &FlattenConfig,
) -> Result<FlattenOutput, FlattenError> {
    let total_start = Instant::now();
    let mut run = Run::new(config.progress_callback.as_ref());
    info!(
        "Starting flatten: {} bytes with {}",
        document.len(),
        rasterizer.name()
    );

    if let Err(e) = input::validate_document(document) {
        run.fail(&e);
        return Err(e);
    }

    let workspace = match Workspace::acquire(config.workspace_root.as_deref()) {
        Ok(ws) => ws,
        Err(e) => {
            run.fail(&e);
            return Err(e);
        }
    };
    run.advance(PipelineState::WorkspaceAcquired);

    let result = run_stages(rasterizer, document, &workspace, config, &mut run).await;

    // Cleanup is unconditional.
    workspace.release().await;

    match result {
        Ok(mut output) => {
            output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
            run.advance(PipelineState::Done);
            info!(
                "Flatten complete: {} pages, {} bytes, {}ms total",
                output.stats.page_count, output.stats.output_bytes, output.stats.total_duration_ms
            );
            if let Some(cb) = config.progress_callback.as_ref() {
                cb.on_flatten_complete(output.stats.page_count, output.stats.output_bytes);
            }
            Ok(output)
        }
        Err(e) => {
            run.fail(&e);
            Err(e)
        }
    }
}

/// Flatten a base64-wrapped PDF and return the result base64-wrapped.
pub async fn flatten_base64(encoded: &str, config: &FlattenConfig) -> Result<String, FlattenError> {
    let document = input::decode_base64_document(encoded)?;
    let output = flatten(&document, config).await?;
    Ok(input::encode_base64_document(&output.pdf))
}

/// Flatten a local PDF file.
pub async fn flatten_file(
    path: impl AsRef<Path>,
    config: &FlattenConfig,
) -> Result<FlattenOutput, FlattenError> {
    let document = input::read_local(path.as_ref()).await?;
    flatten(&document, config).await
}

/// Flatten a local PDF and write the result to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn flatten_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &FlattenConfig,
) -> Result<FlattenStats, FlattenError> {
    let output = flatten_file(input_path, config).await?;
    write_atomic(output_path.as_ref(), &output.pdf).await?;
    Ok(output.stats)
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FlattenError> {
    let write_err = |source| FlattenError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

/// Synchronous wrapper around [`flatten`].
///
/// Creates a temporary tokio runtime internally.
pub fn flatten_sync(
    document: &[u8],
    config: &FlattenConfig,
) -> Result<FlattenOutput, FlattenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FlattenError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(flatten(document, config))
}

/// Pick the rasteriser for `config`: the injected one, else the configured engine.
pub fn resolve_rasterizer(config: &FlattenConfig) -> Arc<dyn Rasterizer> {
    if let Some(ref rasterizer) = config.rasterizer {
        return Arc::clone(rasterizer);
    }

    match config.engine {
        RasterEngine::Pdftoppm => Arc::new(
            PdftoppmRasterizer::new(&config.pdftoppm_path)
                .with_leading_args(config.pdftoppm_args.iter().cloned()),
        ),
        RasterEngine::Pdfium => Arc::new(match config.pdfium_library_path {
            Some(ref path) => PdfiumRasterizer::with_library_path(path),
            None => PdfiumRasterizer::new(),
        }),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_stages(
    rasterizer: &dyn Rasterizer,
    document: &[u8],
    workspace: &Workspace,
    config: &FlattenConfig,
    run: &mut Run<'_>,
) -> Result<FlattenOutput, FlattenError> {
    // ── Rasterize ────────────────────────────────────────────────────────
    let raster_start = Instant::now();
    let options = RasterOptions {
        resolution: config.resolution,
        password: config.password.clone(),
        timeout: config.raster_timeout(),
        max_rendered_pixels: config.max_rendered_pixels,
    };
    let mut pages = rasterizer.rasterize(document, workspace, &options).await?;
    ensure_page_sequence(&mut pages)?;
    let rasterize_duration_ms = raster_start.elapsed().as_millis() as u64;
    run.advance(PipelineState::Rasterized);
    if let Some(cb) = config.progress_callback.as_ref() {
        cb.on_pages_rasterized(pages.len());
    }
    info!(
        "Rasterized {} pages in {}ms",
        pages.len(),
        rasterize_duration_ms
    );

    // ── Normalize ────────────────────────────────────────────────────────
    let normalize_start = Instant::now();
    let normalized = normalize_pages(pages, config).await?;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
    run.advance(PipelineState::Normalized);
    info!(
        "Normalized {} pages in {}ms",
        normalized.len(),
        normalize_duration_ms
    );

    // ── Assemble ─────────────────────────────────────────────────────────
    let assemble_start = Instant::now();
    let placed: Vec<PlacedImage> = normalized
        .into_iter()
        .map(|image| {
            let placement = placement_for(&image, config.page_size, config.embed_dpi, config.fit);
            PlacedImage { image, placement }
        })
        .collect();
    let summaries: Vec<PageSummary> = placed
        .iter()
        .map(|p| PageSummary {
            index: p.image.index,
            source_width: p.image.source_width,
            source_height: p.image.source_height,
            width: p.image.width,
            height: p.image.height,
            placement: p.placement,
        })
        .collect();

    let page_size = config.page_size;
    let title = config.title.clone();
    let pdf = tokio::task::spawn_blocking(move || assemble(&placed, page_size, &title))
        .await
        .map_err(|e| FlattenError::Internal(format!("Assemble task panicked: {e}")))??;
    let assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;
    run.advance(PipelineState::Assembled);

    let stats = FlattenStats {
        page_count: summaries.len(),
        page_size: config.page_size,
        fit: config.fit,
        encoding: config.encoding,
        rasterizer: rasterizer.name().to_string(),
        input_bytes: document.len(),
        output_bytes: pdf.len(),
        rasterize_duration_ms,
        normalize_duration_ms,
        assemble_duration_ms,
        total_duration_ms: 0,
    };

    Ok(FlattenOutput {
        pdf,
        pages: summaries,
        stats,
    })
}

/// Sort pages by index and require exactly `0..n`.
fn ensure_page_sequence(pages: &mut [PageImage]) -> Result<(), FlattenError> {
    pages.sort_by_key(|p| p.index);
    for (position, page) in pages.iter().enumerate() {
        if page.index != position {
            return Err(FlattenError::rasterization(format!(
                "page sequence is not contiguous: expected page {}, found page {}",
                position + 1,
                page.index + 1
            )));
        }
    }
    Ok(())
}

/// Normalise every page on the blocking pool, `config.concurrency` at a time,
/// and return the results in page order.
async fn normalize_pages(
    pages: Vec<PageImage>,
    config: &FlattenConfig,
) -> Result<Vec<NormalizedImage>, FlattenError> {
    let (target_width, target_height) = config.target_pixels();
    let options = NormalizeOptions {
        fit: config.fit,
        encoding: config.encoding,
        jpeg_quality: config.jpeg_quality,
    };
    let total = pages.len();
    debug!(
        "Normalizing {} pages into {}x{} px ({} at a time)",
        total, target_width, target_height, config.concurrency
    );

    // Every task is drained, even after a failure: the caller releases the
    // workspace next and no blocking read may still be running against it.
    let mut results: Vec<(usize, Result<NormalizedImage, FlattenError>)> =
        stream::iter(pages.into_iter().map(|page| {
            let callback = config.progress_callback.clone();
            async move {
                let index = page.index;
                let result = tokio::task::spawn_blocking(move || {
                    normalize(&page, target_width, target_height, &options)
                })
                .await
                .map_err(|e| FlattenError::Internal(format!("Normalize task panicked: {e}")))
                .and_then(|r| r);

                if let (Ok(_), Some(cb)) = (&result, &callback) {
                    cb.on_page_normalized(index, total);
                }
                (index, result)
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    // Completion order is arbitrary; page order is not. The first failing
    // page wins, so the reported error does not depend on scheduling.
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rasterize::PageSource;
    use std::path::PathBuf;

    fn page(index: usize) -> PageImage {
        PageImage {
            index,
            source: PageSource::File(PathBuf::from(format!("page-{}.png", index + 1))),
        }
    }

    #[test]
    fn page_sequence_is_sorted_by_index() {
        let mut pages = vec![page(2), page(0), page(1)];
        ensure_page_sequence(&mut pages).unwrap();
        assert_eq!(
            pages.iter().map(|p| p.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn page_sequence_with_gap_is_rejected() {
        let mut pages = vec![page(0), page(2)];
        let err = ensure_page_sequence(&mut pages).unwrap_err();
        assert!(matches!(err, FlattenError::Rasterization { .. }));
    }

    #[test]
    fn page_sequence_not_starting_at_zero_is_rejected() {
        let mut pages = vec![page(1), page(2)];
        assert!(ensure_page_sequence(&mut pages).is_err());
    }

    #[test]
    fn resolve_prefers_injected_rasterizer() {
        let injected: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::new());
        let config = FlattenConfig::builder()
            .rasterizer(Arc::clone(&injected))
            .build()
            .unwrap();
        assert_eq!(resolve_rasterizer(&config).name(), "pdfium");

        let config = FlattenConfig::default();
        assert_eq!(resolve_rasterizer(&config).name(), "pdftoppm");

        let config = FlattenConfig::builder()
            .engine(RasterEngine::Pdfium)
            .build()
            .unwrap();
        assert_eq!(resolve_rasterizer(&config).name(), "pdfium");
    }

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Rasterized.is_terminal());
        assert_eq!(PipelineState::WorkspaceAcquired.to_string(), "workspace acquired");
    }

    #[tokio::test]
    async fn non_pdf_input_fails_before_workspace() {
        let root = tempfile::tempdir().unwrap();
        let config = FlattenConfig::builder()
            .workspace_root(root.path())
            .build()
            .unwrap();
        let err = flatten(b"hello", &config).await.unwrap_err();
        assert!(matches!(err, FlattenError::InputValidation(_)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn write_atomic_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out.pdf");
        write_atomic(&out, b"%PDF-first").await.unwrap();
        write_atomic(&out, b"%PDF-second").await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-second");
        assert!(!out.with_extension("pdf.tmp").exists());
    }
}
