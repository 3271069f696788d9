//! Time-varying field sources and the snapshot adapter that freezes them.
//!
//! A [`FieldSource`] produces a vector at any point in space and time. The
//! DFLIC driver renders one frame at a time, so a source is frozen at the
//! frame's time with [`Snapshot`], which implements [`VectorField`].
//!
//! All implementations are deterministic: same inputs produce the same output.

use glam::DVec2;
use noise::{NoiseFn, Perlin};

use crate::vector::VectorField;

/// A source of 2D vectors that may change over time.
pub trait FieldSource: Send + Sync {
    /// Sample the field at position `p` at the given time.
    fn sample(&self, p: DVec2, time: f64) -> DVec2;

    /// Points where streamlines must terminate at the given time.
    fn singularities(&self, _time: f64) -> Vec<DVec2> {
        Vec::new()
    }
}

impl<S: FieldSource + ?Sized> FieldSource for &S {
    fn sample(&self, p: DVec2, time: f64) -> DVec2 {
        (**self).sample(p, time)
    }

    fn singularities(&self, time: f64) -> Vec<DVec2> {
        (**self).singularities(time)
    }
}

impl<S: FieldSource + ?Sized> FieldSource for Box<S> {
    fn sample(&self, p: DVec2, time: f64) -> DVec2 {
        (**self).sample(p, time)
    }

    fn singularities(&self, time: f64) -> Vec<DVec2> {
        (**self).singularities(time)
    }
}

/// A [`FieldSource`] frozen at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot<S> {
    source: S,
    time: f64,
}

impl<S: FieldSource> Snapshot<S> {
    pub fn new(source: S, time: f64) -> Self {
        Self { source, time }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// The source's singularities at the snapshot time.
    pub fn singularities(&self) -> Vec<DVec2> {
        self.source.singularities(self.time)
    }
}

impl<S: FieldSource> VectorField for Snapshot<S> {
    #[inline]
    fn evaluate(&self, p: DVec2) -> DVec2 {
        self.source.sample(p, self.time)
    }
}

/// Distances below this are treated as zero.
const SINGULARITY_EPS: f64 = 1e-10;

/// Constant flow in a fixed direction.
#[derive(Debug, Clone, Copy)]
pub struct UniformFlow {
    pub velocity: DVec2,
}

/// Rotational vortex with Gaussian distance falloff.
#[derive(Debug, Clone, Copy)]
pub struct Vortex {
    pub center: DVec2,
    pub strength: f64,
    pub radius: f64,
}

/// Velocity of a frame rotating about `center` at `omega` radians per unit time.
///
/// Used as the motion field for sources whose structure co-rotates.
#[derive(Debug, Clone, Copy)]
pub struct RigidRotation {
    pub center: DVec2,
    pub omega: f64,
}

/// Curl of 3D Perlin noise, with time as the third axis.
///
/// The curl of a scalar potential is divergence free, so streamlines neither
/// converge nor spread out.
pub struct CurlNoise {
    noise: Perlin,
    scale: f64,
    strength: f64,
    eps: f64,
}

/// Two opposite 2D point charges orbiting the origin.
///
/// The field is `sum q (p - c) / |p - c|^2` over both charges; the charges
/// themselves are reported as singularities.
#[derive(Debug, Clone, Copy)]
pub struct RotatingDipole {
    /// Distance from the origin to each charge.
    pub separation: f64,
    /// Angular velocity of the pair.
    pub omega: f64,
    /// Charge magnitude.
    pub charge: f64,
}

/// Sums the vectors of several sources.
#[derive(Default)]
pub struct CompositeField {
    sources: Vec<Box<dyn FieldSource>>,
}

impl CurlNoise {
    /// Creates a curl noise source with a finite-difference step of 0.001.
    pub fn new(scale: f64, strength: f64, seed: u32) -> Self {
        Self {
            noise: Perlin::new(seed),
            scale,
            strength,
            eps: 0.001,
        }
    }
}

impl RotatingDipole {
    /// Positions of the positive and negative charge at `time`.
    pub fn charges(&self, time: f64) -> [DVec2; 2] {
        let arm = DVec2::from_angle(self.omega * time) * self.separation;
        [arm, -arm]
    }
}

impl CompositeField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source to the composite (builder pattern).
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, source: Box<dyn FieldSource>) -> Self {
        self.sources.push(source);
        self
    }
}

impl FieldSource for UniformFlow {
    fn sample(&self, _p: DVec2, _time: f64) -> DVec2 {
        self.velocity
    }
}

impl FieldSource for Vortex {
    fn sample(&self, p: DVec2, _time: f64) -> DVec2 {
        let r = p - self.center;
        let dist_sq = r.length_squared();
        let dist = dist_sq.sqrt();
        if dist < SINGULARITY_EPS || self.radius.abs() < SINGULARITY_EPS {
            return DVec2::ZERO;
        }
        let falloff = (-dist_sq / (2.0 * self.radius * self.radius)).exp();
        r.perp() / dist * self.strength * falloff
    }

    fn singularities(&self, _time: f64) -> Vec<DVec2> {
        vec![self.center]
    }
}

impl FieldSource for RigidRotation {
    fn sample(&self, p: DVec2, _time: f64) -> DVec2 {
        (p - self.center).perp() * self.omega
    }
}

impl FieldSource for CurlNoise {
    fn sample(&self, p: DVec2, time: f64) -> DVec2 {
        let s = p * self.scale;
        let eps = self.eps * self.scale;
        if eps.abs() < SINGULARITY_EPS {
            return DVec2::ZERO;
        }
        // curl F = (dF/dy, -dF/dx)
        let df_dy =
            (self.noise.get([s.x, s.y + eps, time]) - self.noise.get([s.x, s.y - eps, time])) / (2.0 * eps);
        let df_dx =
            (self.noise.get([s.x + eps, s.y, time]) - self.noise.get([s.x - eps, s.y, time])) / (2.0 * eps);
        DVec2::new(df_dy, -df_dx) * self.strength
    }
}

impl FieldSource for RotatingDipole {
    fn sample(&self, p: DVec2, time: f64) -> DVec2 {
        let [plus, minus] = self.charges(time);
        let term = |c: DVec2| {
            let r = p - c;
            let d2 = r.length_squared();
            if d2 < SINGULARITY_EPS {
                DVec2::ZERO
            } else {
                r / d2
            }
        };
        (term(plus) - term(minus)) * self.charge
    }

    fn singularities(&self, time: f64) -> Vec<DVec2> {
        self.charges(time).to_vec()
    }
}

impl FieldSource for CompositeField {
    fn sample(&self, p: DVec2, time: f64) -> DVec2 {
        self.sources
            .iter()
            .fold(DVec2::ZERO, |acc, source| acc + source.sample(p, time))
    }

    fn singularities(&self, time: f64) -> Vec<DVec2> {
        self.sources
            .iter()
            .flat_map(|source| source.singularities(time))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_freezes_time() {
        let curl = CurlNoise::new(2.0, 1.0, 7);
        let p = DVec2::new(0.3, -0.4);
        let mut snap = Snapshot::new(&curl, 0.5);
        assert_eq!(snap.evaluate(p), curl.sample(p, 0.5));
        snap.set_time(1.5);
        assert_eq!(snap.evaluate(p), curl.sample(p, 1.5));
    }

    #[test]
    fn vortex_creates_rotational_field() {
        let v = Vortex {
            center: DVec2::ZERO,
            strength: 1.0,
            radius: 1.0,
        };
        let p = DVec2::new(0.5, 0.0);
        let f = v.sample(p, 0.0);
        assert!(f.dot(p).abs() < 1e-12, "vortex should be tangential, got {f}");
        assert!(f.y > 0.0, "counter-clockwise rotation expected, got {f}");
    }

    #[test]
    fn vortex_at_center_returns_zero_and_is_singular() {
        let v = Vortex {
            center: DVec2::new(1.0, 1.0),
            strength: 2.0,
            radius: 0.5,
        };
        assert_eq!(v.sample(DVec2::new(1.0, 1.0), 0.0), DVec2::ZERO);
        assert_eq!(v.singularities(0.0), vec![DVec2::new(1.0, 1.0)]);
    }

    #[test]
    fn vortex_falls_off_with_distance() {
        let v = Vortex {
            center: DVec2::ZERO,
            strength: 1.0,
            radius: 0.5,
        };
        let near = v.sample(DVec2::new(0.2, 0.0), 0.0).length();
        let far = v.sample(DVec2::new(1.5, 0.0), 0.0).length();
        assert!(near > far, "near {near} should exceed far {far}");
    }

    #[test]
    fn rigid_rotation_is_perpendicular_to_radius() {
        let rot = RigidRotation {
            center: DVec2::ZERO,
            omega: 2.0,
        };
        let p = DVec2::new(0.0, 3.0);
        assert!((rot.sample(p, 0.0) - DVec2::new(-6.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn curl_noise_approximately_divergence_free() {
        let curl = CurlNoise::new(1.5, 1.0, 42);
        let h = 1e-4;
        for &(x, y) in &[(0.1, 0.2), (-0.7, 0.4), (1.3, -2.2)] {
            let p = DVec2::new(x, y);
            let dvx = (curl.sample(p + DVec2::X * h, 0.3).x - curl.sample(p - DVec2::X * h, 0.3).x) / (2.0 * h);
            let dvy = (curl.sample(p + DVec2::Y * h, 0.3).y - curl.sample(p - DVec2::Y * h, 0.3).y) / (2.0 * h);
            let magnitude = curl.sample(p, 0.3).length().max(1.0);
            assert!((dvx + dvy).abs() < 0.05 * magnitude * 10.0, "divergence {} at {p}", dvx + dvy);
        }
    }

    #[test]
    fn dipole_points_from_positive_to_negative_between_charges() {
        let dipole = RotatingDipole {
            separation: 0.5,
            omega: 0.0,
            charge: 1.0,
        };
        // Positive charge at (0.5, 0), negative at (-0.5, 0).
        let f = dipole.sample(DVec2::ZERO, 0.0);
        assert!(f.x < 0.0, "field at the midpoint should point toward the negative charge, got {f}");
        assert!(f.y.abs() < 1e-12);
    }

    #[test]
    fn dipole_charges_rotate() {
        let dipole = RotatingDipole {
            separation: 1.0,
            omega: std::f64::consts::FRAC_PI_2,
            charge: 1.0,
        };
        let [plus, minus] = dipole.charges(1.0);
        assert!((plus - DVec2::Y).length() < 1e-12);
        assert!((minus + DVec2::Y).length() < 1e-12);
        assert_eq!(dipole.singularities(1.0).len(), 2);
    }

    #[test]
    fn empty_composite_returns_zero() {
        let c = CompositeField::new();
        assert_eq!(c.sample(DVec2::new(1.0, 2.0), 0.0), DVec2::ZERO);
        assert!(c.singularities(0.0).is_empty());
    }

    #[test]
    fn composite_sums_sources_and_singularities() {
        let c = CompositeField::new()
            .add(Box::new(UniformFlow {
                velocity: DVec2::new(1.0, 0.0),
            }))
            .add(Box::new(UniformFlow {
                velocity: DVec2::new(0.0, 2.0),
            }))
            .add(Box::new(Vortex {
                center: DVec2::new(9.0, 9.0),
                strength: 0.0,
                radius: 1.0,
            }));
        assert!((c.sample(DVec2::ZERO, 0.0) - DVec2::new(1.0, 2.0)).length() < 1e-12);
        assert_eq!(c.singularities(0.0), vec![DVec2::new(9.0, 9.0)]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn all_sources_return_finite_values(
                x in -10.0_f64..10.0,
                y in -10.0_f64..10.0,
                t in 0.0_f64..100.0,
            ) {
                let p = DVec2::new(x, y);
                let sources: Vec<Box<dyn FieldSource>> = vec![
                    Box::new(UniformFlow { velocity: DVec2::new(1.0, -1.0) }),
                    Box::new(Vortex { center: DVec2::ZERO, strength: 1.0, radius: 1.0 }),
                    Box::new(RigidRotation { center: DVec2::ZERO, omega: 0.5 }),
                    Box::new(CurlNoise::new(1.0, 1.0, 3)),
                    Box::new(RotatingDipole { separation: 0.5, omega: 1.0, charge: 1.0 }),
                ];
                for s in &sources {
                    prop_assert!(s.sample(p, t).is_finite());
                }
            }
        }
    }
}
