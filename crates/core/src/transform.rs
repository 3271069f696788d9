//! Uniformly scaled rigid transforms between field space and image space.
//!
//! FLIC relies on arc length being preserved up to a single scale factor
//! when mapping streamlines from field space into the input and output
//! images, so only rotations, reflections, uniform scales and translations
//! are accepted. Anything else is rejected at construction.

use glam::{DMat2, DVec2};

use crate::error::FlowError;

/// Relative tolerance for the orthogonality / equal-length check.
const RIGID_EPS: f64 = 1e-9;

/// Affine map `p' = M p + o` where `M` is a scaled orthogonal matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    matrix: DMat2,
    origin: DVec2,
    inverse_matrix: DMat2,
    scale: f64,
}

/// Returns `true` if `m` is a non-degenerate uniformly scaled orthogonal matrix.
pub fn is_rigid_scaled(m: &DMat2) -> bool {
    let a = m.x_axis;
    let b = m.y_axis;
    let la = a.length_squared();
    let lb = b.length_squared();
    let largest = la.max(lb);
    if !(largest.is_finite() && largest > 0.0) {
        return false;
    }
    (la - lb).abs() <= RIGID_EPS * largest && a.dot(b).abs() <= RIGID_EPS * largest
}

impl RigidTransform {
    /// The identity map.
    pub fn identity() -> Self {
        Self {
            matrix: DMat2::IDENTITY,
            origin: DVec2::ZERO,
            inverse_matrix: DMat2::IDENTITY,
            scale: 1.0,
        }
    }

    /// `p' = scale * p + origin`.
    pub fn new(origin: DVec2, scale: f64) -> Result<Self, FlowError> {
        Self::from_matrix(DMat2::from_diagonal(DVec2::splat(scale)), origin)
    }

    /// Builds a transform from an explicit linear part.
    ///
    /// Returns `FlowError::SingularTransform` for a zero or non-finite matrix
    /// and `FlowError::NotRigidScaled` for shears or non-uniform scales.
    pub fn from_matrix(matrix: DMat2, origin: DVec2) -> Result<Self, FlowError> {
        let det = matrix.determinant();
        if det == 0.0 || !det.is_finite() || !origin.is_finite() {
            return Err(FlowError::SingularTransform);
        }
        if !is_rigid_scaled(&matrix) {
            return Err(FlowError::NotRigidScaled);
        }
        Ok(Self {
            matrix,
            origin,
            inverse_matrix: matrix.inverse(),
            scale: det.abs().sqrt(),
        })
    }

    /// Builds a transform whose columns are the images of the unit axes.
    pub fn from_axes(origin: DVec2, x_axis: DVec2, y_axis: DVec2) -> Result<Self, FlowError> {
        Self::from_matrix(DMat2::from_cols(x_axis, y_axis), origin)
    }

    /// Maps `p` from the source space into the destination space.
    #[inline]
    pub fn forward(&self, p: DVec2) -> DVec2 {
        self.matrix * p + self.origin
    }

    /// Maps `q` from the destination space back into the source space.
    #[inline]
    pub fn inverse(&self, q: DVec2) -> DVec2 {
        self.inverse_matrix * (q - self.origin)
    }

    /// Length scale factor: destination length = `scale() * source length`.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Linear part.
    pub fn matrix(&self) -> DMat2 {
        self.matrix
    }

    /// Translation part.
    pub fn origin(&self) -> DVec2 {
        self.origin
    }

    /// The inverse transform.
    pub fn inverted(&self) -> Self {
        Self {
            matrix: self.inverse_matrix,
            origin: -(self.inverse_matrix * self.origin),
            inverse_matrix: self.matrix,
            scale: 1.0 / self.scale,
        }
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &RigidTransform) -> Self {
        Self {
            matrix: next.matrix * self.matrix,
            origin: next.matrix * self.origin + next.origin,
            inverse_matrix: self.inverse_matrix * next.inverse_matrix,
            scale: self.scale * next.scale,
        }
    }

    /// `self` followed by a translation by `offset` in destination space.
    pub fn translated(&self, offset: DVec2) -> Self {
        Self {
            origin: self.origin + offset,
            ..*self
        }
    }

    /// `self` followed by a uniform scale about the destination origin.
    pub fn scaled(&self, factor: f64) -> Result<Self, FlowError> {
        Ok(self.then(&Self::new(DVec2::ZERO, factor)?))
    }

    /// `self` followed by a counter-clockwise rotation by `theta` radians.
    pub fn rotated(&self, theta: f64) -> Self {
        let rotation = DMat2::from_angle(theta);
        self.then(&Self {
            matrix: rotation,
            origin: DVec2::ZERO,
            inverse_matrix: rotation.transpose(),
            scale: 1.0,
        })
    }

    /// `self` followed by a reflection across the line through the
    /// destination origin with direction `dir`.
    pub fn reflected(&self, dir: DVec2) -> Result<Self, FlowError> {
        let d = dir.try_normalize().ok_or(FlowError::SingularTransform)?;
        let reflection = DMat2::from_cols(
            DVec2::new(2.0 * d.x * d.x - 1.0, 2.0 * d.x * d.y),
            DVec2::new(2.0 * d.x * d.y, 2.0 * d.y * d.y - 1.0),
        );
        Ok(self.then(&Self {
            matrix: reflection,
            origin: DVec2::ZERO,
            inverse_matrix: reflection,
            scale: 1.0,
        }))
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}
