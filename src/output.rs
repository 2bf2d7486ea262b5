//! Output types returned by a successful flatten run.

use crate::config::{FitMode, ImageEncoding, PageSize};
use crate::pipeline::assemble::Placement;
use serde::{Deserialize, Serialize};

/// The flattened document plus what went into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenOutput {
    /// Serialised PDF. Always a complete document with at least one page.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// One entry per output page, in page order.
    pub pages: Vec<PageSummary>,
    pub stats: FlattenStats,
}

/// Geometry of one output page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 0-based page index (output page `k` came from input page `k`).
    pub index: usize,
    /// Pixel size the rasteriser produced.
    pub source_width: u32,
    pub source_height: u32,
    /// Pixel size after fitting.
    pub width: u32,
    pub height: u32,
    /// Where the image sits on the canvas, in points.
    pub placement: Placement,
}

/// Run-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenStats {
    pub page_count: usize,
    pub page_size: PageSize,
    pub fit: FitMode,
    pub encoding: ImageEncoding,
    /// Name of the rasteriser that produced the pages.
    pub rasterizer: String,
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub rasterize_duration_ms: u64,
    pub normalize_duration_ms: u64,
    pub assemble_duration_ms: u64,
    pub total_duration_ms: u64,
}
