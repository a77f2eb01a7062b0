//! Colour inversion: `255 - c` on red, green and blue; alpha untouched.
//!
//! pdfium hands back RGBA8 bitmaps, so the common case is a single pass over
//! the packed byte buffer in strides of four. Any other layout goes through
//! the per-pixel path, which converts each pixel to RGBA8 first. Both paths
//! produce the same bytes for RGBA8 input.

use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

/// Return a colour-inverted copy of `image`.
///
/// The result is always RGBA8 with the same dimensions as the input. The
/// input is never modified, so it can still be read elsewhere.
pub fn invert(image: &DynamicImage) -> DynamicImage {
    let inverted = match image {
        DynamicImage::ImageRgba8(rgba) => invert_rgba8(rgba),
        other => invert_per_pixel(other),
    };
    DynamicImage::ImageRgba8(inverted)
}

/// Bulk pass over a packed RGBA8 buffer.
fn invert_rgba8(src: &RgbaImage) -> RgbaImage {
    let mut out = src.clone();
    for px in out.chunks_exact_mut(4) {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    }
    out
}

/// Slow path for every layout that is not packed RGBA8.
fn invert_per_pixel(src: &DynamicImage) -> RgbaImage {
    let (width, height) = src.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let Rgba([r, g, b, a]) = src.get_pixel(x, y);
        Rgba([255 - r, 255 - g, 255 - b, a])
    })
}
