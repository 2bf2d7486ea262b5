//! Page image normalisation: fit each raster into the page's pixel box and
//! re-encode it for embedding.
//!
//! Output dimensions are a pure function of the source dimensions, the
//! target box and the [`FitMode`]; they never depend on the codec. For
//! `Contain` they are computed with integer arithmetic so that
//! `floor(orig * min(tw/ow, th/oh))` holds exactly, with no float drift on
//! the binding edge.

use crate::config::{FitMode, ImageEncoding};
use crate::error::FlattenError;
use crate::pipeline::rasterize::{PageImage, PageSource};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// How to fit and encode a page.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub fit: FitMode,
    pub encoding: ImageEncoding,
    /// 1–100, used for JPEG only.
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            fit: FitMode::Contain,
            encoding: ImageEncoding::Png,
            jpeg_quality: 90,
        }
    }
}

/// A page image ready to embed.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// 0-based page index, carried over from the [`PageImage`].
    pub index: usize,
    /// Pixel size after fitting.
    pub width: u32,
    pub height: u32,
    /// Pixel size as rasterised.
    pub source_width: u32,
    pub source_height: u32,
    pub encoding: ImageEncoding,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// Largest size with the source aspect ratio that fits inside the target box.
///
/// Images already inside the box are returned unchanged (no upscaling).
/// Neither dimension drops below 1 px.
pub fn fit_inside(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    if width <= target_width && height <= target_height {
        return (width, height);
    }

    let (w, h) = (width as u64, height as u64);
    let (tw, th) = (target_width as u64, target_height as u64);

    // tw/w <= th/h  ⇔  tw*h <= th*w: width is the binding edge.
    if tw * h <= th * w {
        (target_width.max(1), ((h * tw) / w).max(1) as u32)
    } else {
        (((w * th) / h).max(1) as u32, target_height.max(1))
    }
}

/// Output dimensions for `mode`.
pub fn fitted_dimensions(
    mode: FitMode,
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
) -> (u32, u32) {
    match mode {
        FitMode::Contain => fit_inside(width, height, target_width, target_height),
        FitMode::Exact => (target_width.max(1), target_height.max(1)),
    }
}

/// Resize `image` into the target box and re-encode it.
pub fn normalize(
    image: &PageImage,
    target_width: u32,
    target_height: u32,
    options: &NormalizeOptions,
) -> Result<NormalizedImage, FlattenError> {
    let page = image.index + 1;
    let fail = |detail: String| FlattenError::ImageProcessing { page, detail };

    let decoded: Cow<'_, DynamicImage> = match &image.source {
        PageSource::File(path) => Cow::Owned(
            image::ImageReader::open(path)
                .map_err(|e| fail(format!("cannot read image: {e}")))?
                .with_guessed_format()
                .map_err(|e| fail(format!("cannot read image: {e}")))?
                .decode()
                .map_err(|e| fail(format!("cannot decode image: {e}")))?,
        ),
        PageSource::Decoded(img) => Cow::Borrowed(img),
    };

    let (source_width, source_height) = (decoded.width(), decoded.height());
    if source_width == 0 || source_height == 0 {
        return Err(fail("image has zero size".to_string()));
    }

    let (width, height) = fitted_dimensions(
        options.fit,
        source_width,
        source_height,
        target_width,
        target_height,
    );

    let resized = if (width, height) == (source_width, source_height) {
        decoded
    } else {
        Cow::Owned(decoded.resize_exact(width, height, FilterType::Lanczos3))
    };

    // Flattened pages carry no transparency.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let data = encode(&rgb, options).map_err(|e| fail(format!("cannot encode image: {e}")))?;

    debug!(
        "Normalized page {}: {}x{} → {}x{} px ({} bytes)",
        page,
        source_width,
        source_height,
        width,
        height,
        data.len()
    );

    Ok(NormalizedImage {
        index: image.index,
        width,
        height,
        source_width,
        source_height,
        encoding: options.encoding,
        data,
    })
}

fn encode(img: &DynamicImage, options: &NormalizeOptions) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match options.encoding {
        ImageEncoding::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        ImageEncoding::Jpeg => {
            let encoder =
                JpegEncoder::new_with_quality(&mut buf, options.jpeg_quality.clamp(1, 100));
            img.write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}
