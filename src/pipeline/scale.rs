//! Optional resampling before inversion.
//!
//! Catmull-Rom is a cubic filter: it keeps glyph edges sharp when
//! upscaling for readability and avoids aliasing when downscaling for a
//! smaller file. Scaling is a quality knob, so degenerate factors fall back
//! to the original image instead of failing.

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Resample `image` by `factor`, returning the result.
///
/// Target size is `round(width * factor)` × `round(height * factor)`.
/// The input is returned as-is when the factor is exactly 1, not a positive
/// finite number, or when either target dimension rounds to zero.
pub fn scale(image: DynamicImage, factor: f32) -> DynamicImage {
    match target_dimensions(image.width(), image.height(), factor) {
        Some((width, height)) => {
            debug!(
                "Scaling {}x{} → {}x{} (×{})",
                image.width(),
                image.height(),
                width,
                height,
                factor
            );
            image.resize_exact(width, height, FilterType::CatmullRom)
        }
        None => image,
    }
}

/// Compute the scaled size, or `None` when scaling should be skipped.
pub fn target_dimensions(width: u32, height: u32, factor: f32) -> Option<(u32, u32)> {
    if factor == 1.0 || !factor.is_finite() || factor <= 0.0 {
        return None;
    }
    let scaled = |dim: u32| -> Option<u32> {
        let v = (f64::from(dim) * f64::from(factor)).round();
        if v < 1.0 || v > f64::from(u32::MAX) {
            None
        } else {
            Some(v as u32)
        }
    };
    Some((scaled(width)?, scaled(height)?))
}
