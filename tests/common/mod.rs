//! Test rasterizers and helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use pdf_flatten::pipeline::rasterize::{collect_page_files, order_page_files};
use pdf_flatten::{
    FlattenError, FlattenProgressCallback, PageImage, PageSource, PipelineState, RasterOptions,
    Rasterizer, Workspace,
};
use std::path::PathBuf;
use std::sync::Mutex;

/// Minimal payload that passes the `%PDF` check; fake rasterizers ignore it.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n%fake document\n";

/// Solid-colour RGB image; the colour varies with `seed`.
pub fn solid(width: u32, height: u32, seed: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb([seed, 255 - seed, seed / 2]),
    ))
}

/// Returns in-memory pages of the given sizes, in the given index order.
pub struct MemoryRasterizer {
    pub pages: Vec<(usize, u32, u32)>,
}

impl MemoryRasterizer {
    /// `sizes[k]` becomes page `k`.
    pub fn sized(sizes: &[(u32, u32)]) -> Self {
        Self {
            pages: sizes
                .iter()
                .enumerate()
                .map(|(i, &(w, h))| (i, w, h))
                .collect(),
        }
    }
}

#[async_trait]
impl Rasterizer for MemoryRasterizer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn rasterize(
        &self,
        _document: &[u8],
        _workspace: &Workspace,
        _options: &RasterOptions,
    ) -> Result<Vec<PageImage>, FlattenError> {
        Ok(self
            .pages
            .iter()
            .map(|&(index, w, h)| PageImage {
                index,
                source: PageSource::Decoded(solid(w, h, index as u8)),
            })
            .collect())
    }
}

/// Writes PNG files into the workspace under the given page numbers and
/// orders them the way the pdftoppm backend does. Page number `n` is
/// `100 + n` pixels wide. Every workspace it saw is recorded.
pub struct FileRasterizer {
    pub numbers: Vec<u32>,
    pub seen: Mutex<Vec<PathBuf>>,
}

impl FileRasterizer {
    pub fn new(numbers: &[u32]) -> Self {
        Self {
            numbers: numbers.to_vec(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn workspaces(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for FileRasterizer {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn rasterize(
        &self,
        _document: &[u8],
        workspace: &Workspace,
        _options: &RasterOptions,
    ) -> Result<Vec<PageImage>, FlattenError> {
        self.seen.lock().unwrap().push(workspace.path().to_path_buf());
        for &n in &self.numbers {
            solid(100 + n, 80, n as u8)
                .save(workspace.join(format!("page-{n}.png")))
                .map_err(|e| FlattenError::rasterization(e.to_string()))?;
        }
        let files = collect_page_files(workspace.path()).await?;
        order_page_files(files)
    }
}

/// Always fails, after recording the workspace it was given.
pub struct FailingRasterizer {
    pub seen: Mutex<Option<PathBuf>>,
}

impl FailingRasterizer {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Rasterizer for FailingRasterizer {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn rasterize(
        &self,
        _document: &[u8],
        workspace: &Workspace,
        _options: &RasterOptions,
    ) -> Result<Vec<PageImage>, FlattenError> {
        *self.seen.lock().unwrap() = Some(workspace.path().to_path_buf());
        std::fs::write(workspace.join("page-1.png"), b"half-written").unwrap();
        Err(FlattenError::rasterization("Syntax Error: Couldn't read xref table"))
    }
}

/// Records every state transition.
#[derive(Default)]
pub struct StateRecorder {
    pub states: Mutex<Vec<PipelineState>>,
    pub normalized: Mutex<Vec<usize>>,
}

impl FlattenProgressCallback for StateRecorder {
    fn on_state(&self, state: PipelineState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_page_normalized(&self, index: usize, _total: usize) {
        self.normalized.lock().unwrap().push(index);
    }
}

/// Number of entries directly under `dir`.
pub fn entries(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Page count and per-page MediaBox `[w, h]` of a serialised PDF.
pub fn inspect_pdf(bytes: &[u8]) -> (usize, Vec<(f32, f32)>) {
    let doc = lopdf::Document::load_mem(bytes).expect("output must parse as PDF");
    let pages = doc.get_pages();
    let mut boxes = Vec::new();
    for (_, page_id) in pages.iter() {
        let media_box = media_box(&doc, *page_id).expect("page has a MediaBox");
        boxes.push(media_box);
    }
    (pages.len(), boxes)
}

fn media_box(doc: &lopdf::Document, id: lopdf::ObjectId) -> Option<(f32, f32)> {
    let dict = doc.get_object(id).ok()?.as_dict().ok()?;
    match dict.get(b"MediaBox") {
        Ok(obj) => {
            let arr = match obj {
                lopdf::Object::Reference(r) => doc.get_object(*r).ok()?.as_array().ok()?,
                other => other.as_array().ok()?,
            };
            let n: Vec<f32> = arr.iter().filter_map(number).collect();
            (n.len() == 4).then(|| (n[2] - n[0], n[3] - n[1]))
        }
        // Inherited from the page tree.
        Err(_) => {
            let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
            media_box(doc, parent)
        }
    }
}

fn number(obj: &lopdf::Object) -> Option<f32> {
    match obj {
        lopdf::Object::Integer(i) => Some(*i as f32),
        lopdf::Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}
