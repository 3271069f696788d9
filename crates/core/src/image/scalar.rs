use glam::DVec2;

use crate::error::FlowError;
use crate::prng::Xorshift64;

/// A 2D grid of f64 samples in row-major order.
///
/// Integer accessors address pixels `[0, width) x [0, height)`. Viewed as a
/// continuous field the image is defined on `[0, width - 1] x [0, height - 1]`
/// and sampled bilinearly.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarImage {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

/// Splits a continuous coordinate into the lower pixel index and fraction,
/// keeping the last pixel addressable at exactly `n - 1`.
#[inline]
pub(crate) fn split_edge(c: f64, n: usize) -> (usize, f64) {
    if n < 2 {
        return (0, 0.0);
    }
    let last = (n - 1) as f64;
    if c >= last {
        (n - 2, 1.0)
    } else {
        let f = c.floor();
        (f as usize, c - f)
    }
}

/// The four pixels around a continuous point and their bilinear weights.
#[inline]
pub(crate) fn bilinear_taps(p: DVec2) -> [(i64, i64, f64); 4] {
    let fx = p.x.floor();
    let fy = p.y.floor();
    let (x, y) = (fx as i64, fy as i64);
    let (tx, ty) = (p.x - fx, p.y - fy);
    [
        (x, y, (1.0 - tx) * (1.0 - ty)),
        (x + 1, y, tx * (1.0 - ty)),
        (x, y + 1, (1.0 - tx) * ty),
        (x + 1, y + 1, tx * ty),
    ]
}

impl ScalarImage {
    /// Creates a zero-filled image.
    ///
    /// Returns `FlowError::InvalidDimensions` if either dimension is zero
    /// or if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Result<Self, FlowError> {
        if width == 0 || height == 0 {
            return Err(FlowError::InvalidDimensions);
        }
        let len = width
            .checked_mul(height)
            .ok_or(FlowError::InvalidDimensions)?;
        Ok(Self {
            width,
            height,
            data: vec![0.0; len],
        })
    }

    /// Wraps an existing row-major buffer, validating its length.
    pub fn from_data(width: usize, height: usize, data: Vec<f64>) -> Result<Self, FlowError> {
        if width == 0 || height == 0 {
            return Err(FlowError::InvalidDimensions);
        }
        let expected = width
            .checked_mul(height)
            .ok_or(FlowError::InvalidDimensions)?;
        if data.len() != expected {
            return Err(FlowError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; images have at least one pixel.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    #[inline]
    pub(crate) fn index(&self, x: i64, y: i64) -> Option<usize> {
        if self.contains(x, y) {
            Some(y as usize * self.width + x as usize)
        } else {
            None
        }
    }

    /// `true` if `(x, y)` addresses a pixel.
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u64) < self.width as u64 && (y as u64) < self.height as u64
    }

    /// `true` if `p` lies inside the continuous domain `[0, w - 1] x [0, h - 1]`.
    #[inline]
    pub fn contains_point(&self, p: DVec2) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x <= (self.width - 1) as f64 && p.y <= (self.height - 1) as f64
    }

    /// The sample at `(x, y)`, or `None` outside the image.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<f64> {
        self.index(x, y).map(|k| self.data[k])
    }

    /// Stores `s` at `(x, y)`; no effect outside the image.
    #[inline]
    pub fn set(&mut self, x: i64, y: i64, s: f64) {
        if let Some(k) = self.index(x, y) {
            self.data[k] = s;
        }
    }

    /// Adds `s` at `(x, y)`; no effect outside the image.
    #[inline]
    pub fn accumulate(&mut self, x: i64, y: i64, s: f64) {
        if let Some(k) = self.index(x, y) {
            self.data[k] += s;
        }
    }

    /// Bilinear interpolation at `p`, or `None` outside the continuous domain.
    pub fn sample_bilinear(&self, p: DVec2) -> Option<f64> {
        if !self.contains_point(p) {
            return None;
        }
        let (x, tx) = split_edge(p.x, self.width);
        let (y, ty) = split_edge(p.y, self.height);
        let w = self.width;
        let at = |xi: usize, yi: usize| {
            // Degenerate single-row or single-column images only ever use
            // zero-weighted neighbours beyond the edge.
            let xi = xi.min(w - 1);
            let yi = yi.min(self.height - 1);
            self.data[yi * w + xi]
        };
        let top = at(x, y) * (1.0 - tx) + at(x + 1, y) * tx;
        let bottom = at(x, y + 1) * (1.0 - tx) + at(x + 1, y + 1) * tx;
        Some(top * (1.0 - ty) + bottom * ty)
    }

    /// Splats `s` onto the four pixels around `p` with bilinear weights.
    /// Taps outside the image are dropped.
    pub fn accumulate_bilinear(&mut self, p: DVec2, s: f64) {
        for (x, y, b) in bilinear_taps(p) {
            self.accumulate(x, y, s * b);
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// `s <- s * scale + add` for every sample.
    pub fn rescale(&mut self, scale: f64, add: f64) {
        self.data.iter_mut().for_each(|v| *v = *v * scale + add);
    }

    /// Replaces the image with its 3x3 convolution.
    ///
    /// `kernel[0]` is a constant offset; `kernel[1..10]` are the weights of
    /// the neighbourhood in row-major order, top-left first. Pixels beyond
    /// the border count as zero.
    pub fn convolve3x3(&mut self, kernel: &[f64; 10]) {
        let (w, h) = (self.width as i64, self.height as i64);
        let mut out = vec![kernel[0]; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for (t, &c) in kernel[1..].iter().enumerate() {
                    let dx = (t % 3) as i64 - 1;
                    let dy = (t / 3) as i64 - 1;
                    if let Some(s) = self.get(x + dx, y + dy) {
                        acc += c * s;
                    }
                }
                out[(y * w + x) as usize] += acc;
            }
        }
        self.data = out;
    }

    /// Fills the image with uniform noise in `[lo, hi)`.
    pub fn fill_uniform(&mut self, rng: &mut Xorshift64, lo: f64, hi: f64) {
        self.data.iter_mut().for_each(|v| *v = rng.next_range(lo, hi));
    }

    /// Mean and population variance of all samples.
    pub fn moments(&self) -> (f64, f64) {
        let n = self.data.len() as f64;
        let mean = self.data.iter().sum::<f64>() / n;
        let var = self.data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        (mean, var)
    }
}
