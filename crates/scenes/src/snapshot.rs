//! PNG output of a rendered frame.
//!
//! Feature-gated behind `png` (default on) so the registry can be used
//! without pulling in the `image` crate. The byte conversion lives in
//! [`crate::pixel`].

use dflic_core::{AccumImage, FlowError};
use std::path::Path;

use crate::pixel::accum_to_gray;

/// Writes `img` as an 8-bit grayscale PNG.
///
/// Returns `FlowError::InvalidDimensions` if a side overflows `u32`, or
/// `FlowError::Io` on write failure.
pub fn write_png(img: &AccumImage, path: &Path) -> Result<(), FlowError> {
    let gray = accum_to_gray(img);
    let w = u32::try_from(img.width()).map_err(|_| FlowError::InvalidDimensions)?;
    let h = u32::try_from(img.height()).map_err(|_| FlowError::InvalidDimensions)?;
    let out = image::GrayImage::from_raw(w, h, gray)
        .ok_or_else(|| FlowError::Io("gray buffer size mismatch".into()))?;
    out.save(path).map_err(|e| FlowError::Io(e.to_string()))
}
