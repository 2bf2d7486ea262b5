//! Pipeline stages for PDF flattening.
//!
//! Each submodule implements exactly one step, so each is testable alone and
//! the rasterisation backend can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ workspace ──▶ rasterize ──▶ normalize ──▶ assemble
//! (bytes)   (scratch dir)  (PageImage)   (resize/encode) (printpdf)
//! ```
//!
//! 1. [`input`]: base64 transport, local reads, `%PDF` check
//! 2. [`workspace`]: per-request scratch directory, released unconditionally
//! 3. [`rasterize`]: [`rasterize::Rasterizer`] capability and the pdftoppm
//!    subprocess backend; numeric page ordering
//! 4. [`render`]: in-process pdfium backend (`spawn_blocking`)
//! 5. [`normalize`]: fit-inside / exact resize and PNG/JPEG re-encode
//! 6. [`assemble`]: one fixed-size page per image, placed as instructed

pub mod assemble;
pub mod input;
pub mod normalize;
pub mod rasterize;
pub mod render;
pub mod workspace;
