//! Steady 2D vector fields and composable wrappers.
//!
//! A [`VectorField`] is a pure map from position to vector. FLIC evaluates
//! it many millions of times per frame, so implementations must be cheap
//! and side-effect free. Wrappers compose by value: [`UnitField`] rescales
//! to unit length, [`CachedField`] replaces an expensive field with a
//! bilinearly interpolated grid.

use glam::DVec2;

use crate::error::FlowError;

/// A steady 2D vector field.
pub trait VectorField {
    /// The field vector at `p`.
    fn evaluate(&self, p: DVec2) -> DVec2;
}

impl<F: VectorField + ?Sized> VectorField for &F {
    #[inline]
    fn evaluate(&self, p: DVec2) -> DVec2 {
        (**self).evaluate(p)
    }
}

impl<F: VectorField + ?Sized> VectorField for Box<F> {
    #[inline]
    fn evaluate(&self, p: DVec2) -> DVec2 {
        (**self).evaluate(p)
    }
}

/// Adapts a closure into a [`VectorField`].
#[derive(Debug, Clone, Copy)]
pub struct FnField<F>(pub F);

impl<F: Fn(DVec2) -> DVec2> VectorField for FnField<F> {
    #[inline]
    fn evaluate(&self, p: DVec2) -> DVec2 {
        (self.0)(p)
    }
}

/// The wrapped field rescaled to unit length; zero vectors stay zero.
///
/// Integrating a unit field parameterizes streamlines by arc length.
#[derive(Debug, Clone, Copy)]
pub struct UnitField<F> {
    inner: F,
}

impl<F: VectorField> UnitField<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: VectorField> VectorField for UnitField<F> {
    #[inline]
    fn evaluate(&self, p: DVec2) -> DVec2 {
        self.inner.evaluate(p).normalize_or_zero()
    }
}

/// A field precomputed on a regular grid over a rectangle.
///
/// Inside the rectangle values are bilinearly interpolated between the four
/// surrounding grid nodes; outside it the wrapped field is evaluated
/// directly. Call [`CachedField::recompute`] after mutating the wrapped
/// field through [`CachedField::inner_mut`].
#[derive(Debug, Clone)]
pub struct CachedField<F> {
    inner: F,
    lo: DVec2,
    hi: DVec2,
    nx: usize,
    ny: usize,
    /// Grid nodes per field unit along each axis.
    density: DVec2,
    nodes: Vec<DVec2>,
}

impl<F: VectorField> CachedField<F> {
    /// Samples `inner` on an `nx` x `ny` node grid spanning `[lo, hi]`.
    ///
    /// Returns `FlowError::InvalidDimensions` if either node count is below 2
    /// and `FlowError::InvalidParameter` if the rectangle is empty.
    pub fn new(inner: F, lo: DVec2, hi: DVec2, nx: usize, ny: usize) -> Result<Self, FlowError> {
        if nx < 2 || ny < 2 {
            return Err(FlowError::InvalidDimensions);
        }
        if !(hi.x > lo.x && hi.y > lo.y) {
            return Err(FlowError::invalid("cache bounds", "upper corner must exceed lower corner"));
        }
        let len = nx.checked_mul(ny).ok_or(FlowError::InvalidDimensions)?;
        let density = DVec2::new((nx - 1) as f64 / (hi.x - lo.x), (ny - 1) as f64 / (hi.y - lo.y));
        let mut cache = Self {
            inner,
            lo,
            hi,
            nx,
            ny,
            density,
            nodes: vec![DVec2::ZERO; len],
        };
        cache.recompute();
        Ok(cache)
    }

    /// Re-samples the wrapped field at every grid node.
    pub fn recompute(&mut self) {
        let step = DVec2::ONE / self.density;
        for j in 0..self.ny {
            for i in 0..self.nx {
                let p = self.lo + DVec2::new(i as f64, j as f64) * step;
                self.nodes[j * self.nx + i] = self.inner.evaluate(p);
            }
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// Lower and upper corners of the cached rectangle.
    pub fn bounds(&self) -> (DVec2, DVec2) {
        (self.lo, self.hi)
    }
}

/// Splits a continuous grid coordinate into a cell index and fraction,
/// keeping the last node addressable at exactly `n - 1`.
fn cell(g: f64, n: usize) -> (usize, f64) {
    let last = (n - 1) as f64;
    if g >= last {
        (n - 2, 1.0)
    } else {
        let f = g.floor();
        (f as usize, g - f)
    }
}

impl<F: VectorField> VectorField for CachedField<F> {
    fn evaluate(&self, p: DVec2) -> DVec2 {
        let g = (p - self.lo) * self.density;
        if g.x < 0.0 || g.y < 0.0 || g.x > (self.nx - 1) as f64 || g.y > (self.ny - 1) as f64 {
            return self.inner.evaluate(p);
        }
        let (ix, fx) = cell(g.x, self.nx);
        let (iy, fy) = cell(g.y, self.ny);
        let k = iy * self.nx + ix;
        let top = self.nodes[k].lerp(self.nodes[k + 1], fx);
        let bottom = self.nodes[k + self.nx].lerp(self.nodes[k + self.nx + 1], fx);
        top.lerp(bottom, fy)
    }
}
