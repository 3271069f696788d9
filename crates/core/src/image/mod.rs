//! Raster buffers: plain scalar images and weighted accumulation images.

mod accum;
mod scalar;

pub use accum::AccumImage;
pub use scalar::ScalarImage;
