//! No-op edit detection: is the pipeline output effectively the input?

use image::DynamicImage;

/// RMS difference (0–255 scale) below which two images count as identical.
pub const IDENTICAL_RMS_THRESHOLD: f64 = 5.0;

/// Root-mean-square per-channel difference of two equally sized images.
///
/// Returns `None` when the dimensions differ.
pub fn rms_difference(a: &DynamicImage, b: &DynamicImage) -> Option<f64> {
    if a.width() != b.width() || a.height() != b.height() {
        return None;
    }

    let a = a.to_rgb8();
    let b = b.to_rgb8();
    let samples = a.as_raw().len();
    if samples == 0 {
        return Some(0.0);
    }

    let sum_sq: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| {
            let d = u64::from(x.abs_diff(*y));
            d * d
        })
        .sum();

    Some((sum_sq as f64 / samples as f64).sqrt())
}

/// Whether `a` and `b` are the same picture for pipeline purposes.
///
/// Different dimensions are never identical. Equal pixels (an empty
/// difference bounding box) always are. Otherwise the RMS difference must
/// fall below [`IDENTICAL_RMS_THRESHOLD`].
pub fn is_identical(a: &DynamicImage, b: &DynamicImage) -> bool {
    match rms_difference(a, b) {
        None => false,
        Some(rms) if rms == 0.0 => true,
        Some(rms) => rms < IDENTICAL_RMS_THRESHOLD,
    }
}
