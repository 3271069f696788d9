use glam::DVec2;

use super::scalar::{bilinear_taps, ScalarImage};
use crate::error::FlowError;

/// A [`ScalarImage`] of weight-premultiplied values plus a weight per pixel.
///
/// A pixel is *covered* once its weight reaches `min_weight`. The number of
/// covered pixels is maintained incrementally: every mutation uncounts the
/// pixel before changing it and recounts it afterwards, so [`coverage`]
/// is always an exact census.
///
/// [`coverage`]: AccumImage::coverage
#[derive(Debug, Clone)]
pub struct AccumImage {
    values: ScalarImage,
    weights: Vec<f64>,
    min_weight: f64,
    coverage: usize,
}

impl AccumImage {
    /// Creates an empty image with a minimum weight of 1.
    pub fn new(width: usize, height: usize) -> Result<Self, FlowError> {
        let values = ScalarImage::new(width, height)?;
        let len = values.len();
        Ok(Self {
            values,
            weights: vec![0.0; len],
            min_weight: 1.0,
            coverage: 0,
        })
    }

    pub fn width(&self) -> usize {
        self.values.width()
    }

    pub fn height(&self) -> usize {
        self.values.height()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// The premultiplied values. After [`AccumImage::normalize`] these are
    /// the plain pixel values.
    pub fn values(&self) -> &ScalarImage {
        &self.values
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.values.contains(x, y)
    }

    pub fn contains_point(&self, p: DVec2) -> bool {
        self.values.contains_point(p)
    }

    /// Number of pixels whose weight is at least `min_weight`.
    pub fn coverage(&self) -> usize {
        self.coverage
    }

    pub fn min_weight(&self) -> f64 {
        self.min_weight
    }

    /// Changes the coverage threshold and recounts covered pixels.
    pub fn set_min_weight(&mut self, min_weight: f64) {
        self.min_weight = min_weight;
        self.coverage = self.weights.iter().filter(|&&a| a >= min_weight).count();
    }

    /// Weight at `(x, y)`; 0 outside the image.
    #[inline]
    pub fn weight(&self, x: i64, y: i64) -> f64 {
        self.values.index(x, y).map_or(0.0, |k| self.weights[k])
    }

    #[inline]
    pub fn is_covered(&self, x: i64, y: i64) -> bool {
        self.weight(x, y) >= self.min_weight
    }

    /// The value at `(x, y)` with the weight divided out, `Some(0.0)` for an
    /// unweighted pixel and `None` outside the image.
    pub fn value(&self, x: i64, y: i64) -> Option<f64> {
        let k = self.values.index(x, y)?;
        let a = self.weights[k];
        Some(if a != 0.0 { self.values.data()[k] / a } else { 0.0 })
    }

    #[inline]
    fn update(&mut self, k: usize, f: impl FnOnce(&mut f64, &mut f64)) {
        if self.weights[k] >= self.min_weight {
            self.coverage -= 1;
        }
        f(&mut self.values.data_mut()[k], &mut self.weights[k]);
        if self.weights[k] >= self.min_weight {
            self.coverage += 1;
        }
    }

    /// Adds `s` to the value and `w` to the weight at `(x, y)`; no effect
    /// outside the image.
    pub fn accumulate(&mut self, x: i64, y: i64, s: f64, w: f64) {
        if let Some(k) = self.values.index(x, y) {
            self.update(k, |v, a| {
                *v += s;
                *a += w;
            });
        }
    }

    /// Splats `s` around `p`, adding each tap's bilinear weight to its pixel.
    pub fn accumulate_bilinear(&mut self, p: DVec2, s: f64) {
        for (x, y, b) in bilinear_taps(p) {
            self.accumulate(x, y, s * b, b);
        }
    }

    /// Overwrites value and weight at `(x, y)`; no effect outside the image.
    pub fn set(&mut self, x: i64, y: i64, s: f64, w: f64) {
        if let Some(k) = self.values.index(x, y) {
            self.update(k, |v, a| {
                *v = s;
                *a = w;
            });
        }
    }

    fn recount_unit(&mut self) {
        self.coverage = if 1.0 >= self.min_weight { self.len() } else { 0 };
    }

    /// Divides the weight out of every pixel and resets all weights to 1.
    /// Unweighted pixels become 0.
    pub fn normalize(&mut self) {
        for (v, a) in self.values.data_mut().iter_mut().zip(self.weights.iter_mut()) {
            *v = if *a != 0.0 { *v / *a } else { 0.0 };
            *a = 1.0;
        }
        self.recount_unit();
    }

    /// [`AccumImage::normalize`] for a single pixel.
    pub fn normalize_at(&mut self, x: i64, y: i64) {
        if let Some(k) = self.values.index(x, y) {
            self.update(k, |v, a| {
                *v = if *a != 0.0 { *v / *a } else { 0.0 };
                *a = 1.0;
            });
        }
    }

    /// Zero values with unit weight everywhere.
    pub fn fill_unit(&mut self) {
        self.values.clear();
        self.weights.fill(1.0);
        self.recount_unit();
    }

    /// Zero values and zero weights.
    pub fn clear(&mut self) {
        self.values.clear();
        self.weights.fill(0.0);
        self.coverage = 0;
    }

    /// Applies a 3x3 convolution to the values, leaving weights unchanged.
    /// Meaningful after [`AccumImage::normalize`].
    pub fn convolve3x3(&mut self, kernel: &[f64; 10]) {
        self.values.convolve3x3(kernel);
    }
}
