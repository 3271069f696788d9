//! Per-pixel weights of the samples inside one sliding convolution window.

use glam::DVec2;

/// Cells whose magnitude drops below this after a removal are set to zero.
const RESIDUE: f64 = 1e-12;

/// A toroidal grid of bilinear sample weights, indexed by input pixel.
///
/// The grid must be wider than the window's pixel footprint so that no two
/// live samples alias onto the same cell. `sum_sq` tracks `sum(c^2)` over all
/// cells as they change.
#[derive(Debug, Clone)]
pub struct Contributions {
    size: usize,
    cells: Vec<f64>,
    sum_sq: f64,
}

impl Contributions {
    /// A `size x size` grid; sizes below 2 are raised to 2.
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        Self {
            size,
            cells: vec![0.0; size * size],
            sum_sq: 0.0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sum_sq(&self) -> f64 {
        self.sum_sq
    }

    #[inline]
    fn taps(&self, p: DVec2) -> [(usize, f64); 4] {
        let fx = p.x.floor();
        let fy = p.y.floor();
        let n = self.size as i64;
        let i = (fx as i64).rem_euclid(n) as usize;
        let j = (fy as i64).rem_euclid(n) as usize;
        let i2 = if i + 1 == self.size { 0 } else { i + 1 };
        let j2 = if j + 1 == self.size { 0 } else { j + 1 };
        let (tx, ty) = (p.x - fx, p.y - fy);
        let row = self.size;
        [
            (j * row + i, (1.0 - tx) * (1.0 - ty)),
            (j * row + i2, tx * (1.0 - ty)),
            (j2 * row + i, (1.0 - tx) * ty),
            (j2 * row + i2, tx * ty),
        ]
    }

    #[inline]
    fn bump(&mut self, k: usize, a: f64) {
        let c = self.cells[k];
        let c2 = c + a;
        self.sum_sq += c2 * c2 - c * c;
        self.cells[k] = c2;
    }

    /// Records a sample taken at input position `p`.
    pub fn add(&mut self, p: DVec2) {
        for (k, b) in self.taps(p) {
            self.bump(k, b);
        }
    }

    /// Forgets a sample previously recorded at `p`. Rounding residue left
    /// in a cell is flushed to zero.
    pub fn remove(&mut self, p: DVec2) {
        for (k, b) in self.taps(p) {
            self.bump(k, -b);
            let c = self.cells[k];
            if c != 0.0 && c.abs() < RESIDUE {
                self.sum_sq -= c * c;
                self.cells[k] = 0.0;
            }
        }
    }

    /// Zeroes the four cells around `p`.
    pub fn clear_at(&mut self, p: DVec2) {
        for (k, _) in self.taps(p) {
            let c = self.cells[k];
            self.sum_sq -= c * c;
            self.cells[k] = 0.0;
        }
    }

    /// Zeroes the running sum, discarding accumulated rounding error. Only
    /// valid once every cell has been cleared.
    pub fn reset_sum(&mut self) {
        self.sum_sq = 0.0;
    }

    /// Zeroes every cell and the running sum.
    pub fn clear(&mut self) {
        self.cells.fill(0.0);
        self.sum_sq = 0.0;
    }

    /// `total / sqrt(sum(c^2))`: the window sum scaled so that independent
    /// unit-variance inputs give a unit-variance result. Zero for an empty
    /// window.
    #[inline]
    pub fn rescale(&self, total: f64) -> f64 {
        if self.sum_sq > 0.0 {
            total / self.sum_sq.sqrt()
        } else {
            0.0
        }
    }

    /// `true` if every cell is zero.
    pub fn is_clear(&self) -> bool {
        self.cells.iter().all(|&c| c == 0.0)
    }
}
