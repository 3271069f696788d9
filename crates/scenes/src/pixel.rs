//! Grayscale conversion of an [`AccumImage`].
//!
//! Always available (no feature gate) so callers without the `png` feature
//! can still get at the bytes.

use dflic_core::AccumImage;

/// Standard deviations mapped to each end of the gray ramp.
const SPREAD: f64 = 2.0;

/// Maps pixel values onto 8-bit gray, `mean - 2 sigma` to black and
/// `mean + 2 sigma` to white. Weights are divided out first; unweighted
/// pixels read as 0. A flat image comes out mid-gray.
///
/// The buffer has one byte per pixel, row-major.
pub fn accum_to_gray(img: &AccumImage) -> Vec<u8> {
    let values: Vec<f64> = img
        .values()
        .data()
        .iter()
        .zip(img.weights())
        .map(|(&v, &a)| if a != 0.0 { v / a } else { 0.0 })
        .collect();
    let n = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sigma = (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
    if !(sigma > 0.0) {
        return vec![128; values.len()];
    }
    let lo = mean - SPREAD * sigma;
    let span = 2.0 * SPREAD * sigma;
    values
        .iter()
        .map(|&v| (((v - lo) / span).clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}
