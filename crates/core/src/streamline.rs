//! Arc-length sampled streamline tracing.
//!
//! A [`Streamline`] walks one field line with adaptive RK4 and yields points
//! spaced a fixed arc length apart. Each accepted integration step becomes a
//! cubic Hermite segment, and every sample falling inside it is read off the
//! polynomial, so one adaptive step usually serves many samples.
//!
//! A tracer is reused: `start` resets it for a new seed without allocating.

use glam::DVec2;

use crate::config::TracerParams;
use crate::integrate::{adaptive_step, AdaptiveStep};
use crate::vector::{UnitField, VectorField};

/// Why a trace stopped producing samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The requested arc length was reached.
    NaturalEnd,
    /// The step controller could not meet tolerance above the minimum step.
    ErrorFloor,
    /// The trace entered a singularity's exclusion radius or hit a zero vector.
    Singularity,
    /// [`Streamline::stop`] was called.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Tracing,
    Done(Termination),
}

/// Cubic `((a t + b) t + c) t + d` over `t in [0, 1]`, covering arc lengths
/// `[start, start + len]` of the trace.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: f64,
    len: f64,
    /// Last arc length this segment may be sampled at.
    end: f64,
    a: DVec2,
    b: DVec2,
    c: DVec2,
    d: DVec2,
}

impl Segment {
    fn hermite(start: f64, len: f64, end: f64, p0: DVec2, m0: DVec2, p1: DVec2, m1: DVec2) -> Self {
        Self {
            start,
            len,
            end,
            a: 2.0 * p0 - 2.0 * p1 + len * (m0 + m1),
            b: 3.0 * (p1 - p0) - len * (2.0 * m0 + m1),
            c: len * m0,
            d: p0,
        }
    }

    #[inline]
    fn at(&self, s: f64) -> DVec2 {
        let t = (s - self.start) / self.len;
        ((self.a * t + self.b) * t + self.c) * t + self.d
    }
}

/// Distance from `q` to the chord `p0 -> p1`.
fn chord_distance_sq(q: DVec2, p0: DVec2, p1: DVec2) -> f64 {
    let e = p1 - p0;
    let l2 = e.length_squared();
    let t = if l2 > 0.0 {
        ((q - p0).dot(e) / l2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p0 + e * t).distance_squared(q)
}

/// A reusable cursor over one field line.
///
/// Single-threaded: a tracer holds per-trace scratch state and must not be
/// shared between concurrent traces.
pub struct Streamline<'a, F: ?Sized> {
    field: UnitField<&'a F>,
    params: TracerParams,
    spacing: f64,
    radius_sq: f64,
    singularities: &'a [DVec2],

    state: State,
    seed_pending: bool,
    direction: f64,
    length: f64,
    seed: DVec2,
    pos: DVec2,
    deriv: DVec2,
    trial: f64,
    travelled: f64,
    next_arc: f64,
    segment: Option<Segment>,
}

impl<'a, F: VectorField + ?Sized> Streamline<'a, F> {
    /// A tracer over `field` emitting samples every `spacing` units of arc
    /// length. `params` must already be in field units.
    pub fn new(field: &'a F, spacing: f64, params: TracerParams, singularities: &'a [DVec2]) -> Self {
        let radius = params.singularity_radius.unwrap_or(spacing);
        Self {
            field: UnitField::new(field),
            params,
            spacing,
            radius_sq: radius * radius,
            singularities,
            state: State::Idle,
            seed_pending: false,
            direction: 1.0,
            length: 0.0,
            seed: DVec2::ZERO,
            pos: DVec2::ZERO,
            deriv: DVec2::ZERO,
            trial: params.max_step,
            travelled: 0.0,
            next_arc: 0.0,
            segment: None,
        }
    }

    /// Begins a trace at `p`. A positive `length` follows the field, a
    /// negative one runs against it.
    pub fn start(&mut self, p: DVec2, length: f64) {
        self.state = State::Tracing;
        self.seed_pending = true;
        self.direction = if length < 0.0 { -1.0 } else { 1.0 };
        self.length = length.abs();
        self.seed = p;
        self.pos = p;
        self.deriv = self.field.evaluate(p);
        self.trial = self.params.max_step;
        self.travelled = 0.0;
        self.next_arc = 0.0;
        self.segment = None;
    }

    /// Ends the current trace; `next` returns `None` until the next `start`.
    pub fn stop(&mut self) {
        self.finish(Termination::Stopped);
    }

    /// `true` once the trace can yield no more samples.
    pub fn is_stopped(&self) -> bool {
        self.state != State::Tracing
    }

    /// How the last trace ended, or `None` while it is still running.
    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            State::Done(t) => Some(t),
            _ => None,
        }
    }

    /// Sample spacing in field units.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    fn finish(&mut self, t: Termination) {
        self.state = State::Done(t);
        self.segment = None;
    }

    fn near_singularity(&self, p0: DVec2, p1: DVec2) -> bool {
        self.singularities
            .iter()
            .any(|&s| chord_distance_sq(s, p0, p1) < self.radius_sq)
    }

    /// Integrates until a segment covers the next sample, or the trace ends.
    fn advance(&mut self) -> bool {
        if self.next_arc > self.length || self.travelled >= self.length {
            self.finish(Termination::NaturalEnd);
            return false;
        }
        if self.deriv == DVec2::ZERO {
            self.finish(Termination::Singularity);
            return false;
        }
        let h = self.trial.min(self.length - self.travelled);
        match adaptive_step(&self.field, self.pos, self.deriv, h, self.direction, &self.params) {
            AdaptiveStep::BelowMinimum => {
                self.finish(Termination::ErrorFloor);
                false
            }
            AdaptiveStep::Accepted {
                end,
                derivative,
                step,
                next_step,
            } => {
                if self.near_singularity(self.pos, end) {
                    self.finish(Termination::Singularity);
                    return false;
                }
                let start = self.travelled;
                self.travelled += step;
                self.segment = Some(Segment::hermite(
                    start,
                    step,
                    self.travelled.min(self.length),
                    self.pos,
                    self.deriv * self.direction,
                    end,
                    derivative * self.direction,
                ));
                self.pos = end;
                self.deriv = derivative;
                self.trial = next_step;
                true
            }
        }
    }
}

impl<F: VectorField + ?Sized> Iterator for Streamline<'_, F> {
    type Item = DVec2;

    /// The seed first, then one point every `spacing` of arc length.
    fn next(&mut self) -> Option<DVec2> {
        if self.state != State::Tracing {
            return None;
        }
        if self.seed_pending {
            self.seed_pending = false;
            self.next_arc = self.spacing;
            if self.near_singularity(self.seed, self.seed) {
                self.finish(Termination::Singularity);
            }
            return Some(self.seed);
        }
        loop {
            if let Some(seg) = &self.segment {
                if self.next_arc <= seg.end {
                    let p = seg.at(self.next_arc);
                    self.next_arc += self.spacing;
                    return Some(p);
                }
            }
            if !self.advance() {
                return None;
            }
        }
    }
}
