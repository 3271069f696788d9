//! Explicit ODE steppers for `dp/dt = field(p)`.

use glam::DVec2;

use crate::config::TracerParams;
use crate::vector::VectorField;

/// One classic fourth-order Runge-Kutta step of signed size `h`, given the
/// derivative `d0` already evaluated at `p`.
#[inline]
pub fn rk4<F: VectorField + ?Sized>(field: &F, p: DVec2, d0: DVec2, h: f64) -> DVec2 {
    let k2 = field.evaluate(p + d0 * (0.5 * h));
    let k3 = field.evaluate(p + k2 * (0.5 * h));
    let k4 = field.evaluate(p + k3 * h);
    p + (d0 + 2.0 * (k2 + k3) + k4) * (h / 6.0)
}

/// One explicit Euler step of signed size `h`.
#[inline]
pub fn euler<F: VectorField + ?Sized>(field: &F, p: DVec2, h: f64) -> DVec2 {
    p + field.evaluate(p) * h
}

/// Outcome of [`adaptive_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdaptiveStep {
    /// A step of length `step` was taken, ending at `end` where the field is
    /// `derivative`. `next_step` is the suggested length of the next trial.
    Accepted {
        end: DVec2,
        derivative: DVec2,
        step: f64,
        next_step: f64,
    },
    /// The error could not be brought under tolerance above `min_step`.
    BelowMinimum,
}

/// Step-doubling RK4: a full step of length `h` is compared against two
/// half steps and retried with a shorter step until the difference is
/// within `params.tolerance`.
///
/// `direction` is `1.0` to follow the field and `-1.0` to go against it.
/// Step lengths are unsigned. The accepted end point is the two half-step
/// result.
pub fn adaptive_step<F: VectorField + ?Sized>(
    field: &F,
    p: DVec2,
    d0: DVec2,
    h: f64,
    direction: f64,
    params: &TracerParams,
) -> AdaptiveStep {
    let mut h = h.min(params.max_step);
    loop {
        let signed = h * direction;
        let full = rk4(field, p, d0, signed);
        let mid = rk4(field, p, d0, 0.5 * signed);
        let half = rk4(field, mid, field.evaluate(mid), 0.5 * signed);
        let err = (full - half).length();

        let grown = if err == 0.0 {
            params.max_step
        } else {
            (h * params.safety * (params.tolerance / err).powf(0.2)).min(params.max_step)
        };

        if err <= params.tolerance {
            return AdaptiveStep::Accepted {
                end: half,
                derivative: field.evaluate(half),
                step: h,
                next_step: grown,
            };
        }
        if grown < params.min_step || !err.is_finite() {
            return AdaptiveStep::BelowMinimum;
        }
        h = grown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{FnField, UnitField};

    fn rotation() -> FnField<impl Fn(DVec2) -> DVec2> {
        FnField(|p: DVec2| p.perp())
    }

    #[test]
    fn rk4_is_exact_for_constant_field() {
        let f = FnField(|_: DVec2| DVec2::new(2.0, -1.0));
        let p = rk4(&f, DVec2::ZERO, DVec2::new(2.0, -1.0), 0.5);
        assert!((p - DVec2::new(1.0, -0.5)).length() < 1e-12);
    }

    #[test]
    fn rk4_tracks_a_circle() {
        let f = rotation();
        let mut p = DVec2::X;
        let h = std::f64::consts::TAU / 200.0;
        for _ in 0..200 {
            p = rk4(&f, p, f.evaluate(p), h);
        }
        assert!((p - DVec2::X).length() < 1e-6, "ended at {p}");
    }

    #[test]
    fn euler_zero_step_is_noop() {
        let f = rotation();
        let p = DVec2::new(0.3, 0.7);
        assert_eq!(euler(&f, p, 0.0), p);
    }

    #[test]
    fn adaptive_accepts_straight_line_at_max_step() {
        let f = FnField(|_: DVec2| DVec2::X);
        let params = TracerParams::default();
        match adaptive_step(&f, DVec2::ZERO, DVec2::X, 100.0, 1.0, &params) {
            AdaptiveStep::Accepted {
                end,
                step,
                next_step,
                ..
            } => {
                assert_eq!(step, params.max_step);
                assert_eq!(next_step, params.max_step);
                assert!((end - DVec2::new(10.0, 0.0)).length() < 1e-12);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_reverse_goes_backwards() {
        let f = FnField(|_: DVec2| DVec2::Y);
        let params = TracerParams::default();
        match adaptive_step(&f, DVec2::ZERO, DVec2::Y, 1.0, -1.0, &params) {
            AdaptiveStep::Accepted { end, .. } => assert!((end + DVec2::Y).length() < 1e-12),
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_shrinks_on_curved_field() {
        let f = UnitField::new(rotation());
        let params = TracerParams {
            tolerance: 1e-6,
            min_step: 1e-4,
            ..TracerParams::default()
        };
        let p = DVec2::X;
        match adaptive_step(&f, p, f.evaluate(p), 5.0, 1.0, &params) {
            AdaptiveStep::Accepted { end, step, .. } => {
                assert!(step < 5.0, "step should have shrunk, got {step}");
                assert!((end.length() - 1.0).abs() < 1e-5, "left the unit circle: {end}");
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn adaptive_gives_up_below_min_step() {
        // A field that flips direction across x = 0.5 cannot be integrated
        // accurately through the discontinuity.
        let f = FnField(|p: DVec2| if p.x < 0.5 { DVec2::X } else { DVec2::Y * 50.0 });
        let params = TracerParams {
            min_step: 0.4,
            tolerance: 1e-3,
            ..TracerParams::default()
        };
        assert_eq!(
            adaptive_step(&f, DVec2::ZERO, DVec2::X, 1.0, 1.0, &params),
            AdaptiveStep::BelowMinimum
        );
    }
}
