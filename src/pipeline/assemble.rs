//! Document assembly: one fixed-size page per normalised image, via
//! `printpdf` (v0.8 ops-based API).
//!
//! The assembler never reorders. It draws page `k` from `pages[k]` at the
//! [`Placement`] it is handed; deciding where an image goes is
//! [`placement_for`]'s job, called by the orchestrator.

use crate::config::{FitMode, PageSize};
use crate::error::FlattenError;
use crate::pipeline::normalize::NormalizedImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, XObjectTransform,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const PT_TO_MM: f32 = 0.352778;

/// Image rectangle on a page, in PDF points. Origin is bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A normalised image and the rectangle it is drawn into.
#[derive(Debug, Clone)]
pub struct PlacedImage {
    pub image: NormalizedImage,
    pub placement: Placement,
}

/// Where `image` goes on a `page` canvas.
///
/// `embed_dpi` converts pixels to points (`pt = px * 72 / dpi`).
/// `Contain` centers the image: `x = (pageWidth − imageWidth) / 2`,
/// `y = (pageHeight − imageHeight) / 2`. `Exact` covers the whole page from
/// the origin.
pub fn placement_for(
    image: &NormalizedImage,
    page: PageSize,
    embed_dpi: u32,
    fit: FitMode,
) -> Placement {
    match fit {
        FitMode::Exact => Placement {
            x: 0.0,
            y: 0.0,
            width: page.width_pt,
            height: page.height_pt,
        },
        FitMode::Contain => {
            let pt_per_px = 72.0 / embed_dpi.max(1) as f32;
            let width = image.width as f32 * pt_per_px;
            let height = image.height as f32 * pt_per_px;
            Placement {
                x: (page.width_pt - width) / 2.0,
                y: (page.height_pt - height) / 2.0,
                width,
                height,
            }
        }
    }
}

/// Build and serialise a document with one `page_size` page per image.
///
/// Fails with [`FlattenError::EmptyDocument`] when `pages` is empty and with
/// [`FlattenError::Assembly`] when an image cannot be embedded. The returned
/// bytes are always a complete document.
pub fn assemble(
    pages: &[PlacedImage],
    page_size: PageSize,
    title: &str,
) -> Result<Vec<u8>, FlattenError> {
    if pages.is_empty() {
        return Err(FlattenError::EmptyDocument);
    }

    let page_w = Mm(page_size.width_pt * PT_TO_MM);
    let page_h = Mm(page_size.height_pt * PT_TO_MM);

    let mut doc = PdfDocument::new(title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut pdf_pages = Vec::with_capacity(pages.len());

    for placed in pages {
        let image = &placed.image;
        let raw = RawImage::decode_from_bytes(&image.data, &mut warnings).map_err(|e| {
            FlattenError::assembly(format!("cannot embed page {}: {e}", image.index + 1))
        })?;
        let xobj_id = doc.add_image(&raw);

        // At dpi=72 printpdf draws 1 px = 1 pt, so scale = desired_pt / px.
        let p = placed.placement;
        let scale_x = if image.width > 0 {
            p.width / image.width as f32
        } else {
            1.0
        };
        let scale_y = if image.height > 0 {
            p.height / image.height as f32
        } else {
            1.0
        };

        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(p.x)),
                translate_y: Some(Pt(p.y)),
                dpi: Some(72.0),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                rotate: None,
            },
        }];

        debug!(
            "Page {}: {}x{} px at ({:.1}, {:.1}) size {:.1}x{:.1} pt",
            image.index + 1,
            image.width,
            image.height,
            p.x,
            p.y,
            p.width,
            p.height
        );
        pdf_pages.push(PdfPage::new(page_w, page_h, ops));
    }

    doc.with_pages(pdf_pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);

    if !warnings.is_empty() {
        warn!("PDF writer reported {} warnings", warnings.len());
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(FlattenError::assembly("serialised document has no PDF header"));
    }

    Ok(bytes)
}
