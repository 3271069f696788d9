//! Seed point sequences over an integer pixel rectangle.
//!
//! Both iterators yield every point of `[x0, x0 + width - 1] x
//! [y0, y0 + height - 1]` exactly once, as `DVec2` with integral
//! coordinates. The plain constructors use the origin `(0, 0)`.

use glam::DVec2;

use crate::prng::Xorshift64;

/// Left-to-right, top-to-bottom sweep.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    x0: i64,
    y0: i64,
    width: usize,
    height: usize,
    x: usize,
    y: usize,
}

impl RasterGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_origin(0, 0, width, height)
    }

    /// Sweeps the `width x height` rectangle whose top-left point is
    /// `(x0, y0)`.
    pub fn with_origin(x0: i64, y0: i64, width: usize, height: usize) -> Self {
        Self {
            x0,
            y0,
            width,
            height,
            x: 0,
            y: 0,
        }
    }
}

impl Iterator for RasterGrid {
    type Item = DVec2;

    fn next(&mut self) -> Option<DVec2> {
        if self.width == 0 || self.y >= self.height {
            return None;
        }
        let p = DVec2::new((self.x0 + self.x as i64) as f64, (self.y0 + self.y as i64) as f64);
        self.x += 1;
        if self.x == self.width {
            self.x = 0;
            self.y += 1;
        }
        Some(p)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = if self.width == 0 || self.y >= self.height {
            0
        } else {
            (self.height - self.y) * self.width - self.x
        };
        (left, Some(left))
    }
}

/// Block-randomized sweep.
///
/// The rectangle is tiled with square blocks whose side is one eighth of the
/// larger dimension. A cell of the home block is drawn without replacement
/// and then replicated at the same offset in every other block, so early
/// prefixes of the sequence spread evenly over the whole image.
#[derive(Debug, Clone)]
pub struct BlockRandomGrid {
    x0: i64,
    y0: i64,
    width: i64,
    height: i64,
    block: i64,
    covered: Vec<bool>,
    remaining: usize,
    home_x: i64,
    x: i64,
    y: i64,
    rng: Xorshift64,
}

/// Below this many undrawn home cells, draws switch from rejection sampling
/// to an indexed scan.
const REJECTION_LIMIT: usize = 100;

impl BlockRandomGrid {
    pub fn new(width: usize, height: usize, rng: Xorshift64) -> Self {
        Self::with_origin(0, 0, width, height, rng)
    }

    /// Covers the `width x height` rectangle whose top-left point is
    /// `(x0, y0)`.
    pub fn with_origin(x0: i64, y0: i64, width: usize, height: usize, rng: Xorshift64) -> Self {
        let block = (width.max(height) / 8).max(1);
        let (width, height) = (width as i64, height as i64);
        let cells = if width == 0 || height == 0 { 0 } else { block * block };
        Self {
            x0,
            y0,
            width,
            height,
            block: block as i64,
            covered: vec![false; cells],
            remaining: cells,
            home_x: width,
            x: width,
            y: height,
            rng,
        }
    }

    /// Side length of the replication blocks, in pixels.
    pub fn block_size(&self) -> usize {
        self.block as usize
    }

    fn draw_home(&mut self) -> Option<(i64, i64)> {
        if self.remaining == 0 {
            return None;
        }
        let side = self.block as usize;
        let k = if self.remaining > REJECTION_LIMIT {
            loop {
                let k = self.rng.next_usize(side * side);
                if !self.covered[k] {
                    break k;
                }
            }
        } else {
            let n = self.rng.next_usize(self.remaining);
            self.covered
                .iter()
                .enumerate()
                .filter(|&(_, &c)| !c)
                .nth(n)
                .map(|(k, _)| k)?
        };
        self.covered[k] = true;
        self.remaining -= 1;
        Some(((k % side) as i64, (k / side) as i64))
    }
}

impl Iterator for BlockRandomGrid {
    type Item = DVec2;

    fn next(&mut self) -> Option<DVec2> {
        loop {
            if self.x < self.width && self.y < self.height {
                let p = DVec2::new((self.x0 + self.x) as f64, (self.y0 + self.y) as f64);
                self.x += self.block;
                return Some(p);
            }
            if self.x >= self.width {
                self.x = self.home_x;
                self.y += self.block;
            }
            if self.y >= self.height {
                let (gx, gy) = self.draw_home()?;
                self.home_x = gx;
                self.x = gx;
                self.y = gy;
            }
        }
    }
}
