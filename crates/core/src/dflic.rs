//! Dynamic FLIC: temporally coherent FLIC animation.
//!
//! The convolution input is not fresh noise each frame but a texture rebuilt
//! from persistent particles that ride along with the motion field. Each
//! frame the particles are splatted into a padded input image, gaps are
//! refilled with new random particles, crowded pixels are thinned, and FLIC
//! runs seeded from the particle positions. [`Dflic::evolve`] then moves the
//! particles to the next frame's time.

use glam::DVec2;
use log::{debug, info};
use serde::Serialize;

use crate::config::DflicParams;
use crate::error::FlowError;
use crate::flic::{Flic, FlicStats};
use crate::grid::RasterGrid;
use crate::image::AccumImage;
use crate::integrate::euler;
use crate::particles::ParticleArena;
use crate::prng::Xorshift64;
use crate::transform::RigidTransform;
use crate::vector::VectorField;

/// Arena slots reserved per input pixel.
const PARTICLES_PER_PIXEL: usize = 2;

/// What one [`Dflic::compute`] call did to the particle layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// Zero-based index of the rendered frame.
    pub frame: u64,
    /// Particles that had left the input image.
    pub dropped_outside: usize,
    /// Particles removed from overcrowded pixels.
    pub thinned: usize,
    /// Fresh random particles added to sparse pixels.
    pub injected: usize,
    /// Particles standing in for thinned pixels.
    pub representatives: usize,
    /// Particles alive after the frame.
    pub particles: usize,
    pub flic: FlicStats,
}

#[inline]
fn round(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Input pixels added on each side of the output: half a kernel.
fn padding(params: &DflicParams) -> usize {
    (0.5 * params.flic.stream_len).ceil() as usize
}

/// A DFLIC animation: the field being drawn, the motion of its field lines,
/// the particle texture, and the output image.
///
/// `field` and `motion` share one coordinate system, mapped onto the output
/// by `f2o`.
pub struct Dflic<F, M> {
    field: F,
    motion: M,
    f2o: RigidTransform,
    params: DflicParams,
    flic: Flic,
    rng: Xorshift64,
    arena: ParticleArena,
    input: AccumImage,
    output: AccumImage,
    frame: u64,
}

impl<F: VectorField, M: VectorField> Dflic<F, M> {
    /// Sets up an animation rendering into `output`. Nothing is computed
    /// until [`Dflic::compute`].
    ///
    /// Returns `FlowError::InvalidParameter` if `params` does not validate.
    pub fn new(
        field: F,
        motion: M,
        output: AccumImage,
        f2o: RigidTransform,
        params: DflicParams,
        seed: u64,
    ) -> Result<Self, FlowError> {
        params.validate()?;
        let mut rng = Xorshift64::new(seed);
        let flic = Flic::new(params.flic, rng.fork())?;
        let pad = padding(&params);
        let input = AccumImage::new(output.width() + 2 * pad, output.height() + 2 * pad)?;
        Ok(Self {
            field,
            motion,
            f2o,
            params,
            flic,
            rng,
            arena: ParticleArena::new(),
            input,
            output,
            frame: 0,
        })
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    /// Mutable access for time-varying fields.
    pub fn field_mut(&mut self) -> &mut F {
        &mut self.field
    }

    pub fn set_field(&mut self, field: F) {
        self.field = field;
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut M {
        &mut self.motion
    }

    pub fn set_motion(&mut self, motion: M) {
        self.motion = motion;
    }

    pub fn params(&self) -> &DflicParams {
        &self.params
    }

    pub fn set_params(&mut self, params: DflicParams) -> Result<(), FlowError> {
        params.validate()?;
        self.flic.set_params(params.flic)?;
        self.params = params;
        Ok(())
    }

    pub fn transform(&self) -> &RigidTransform {
        &self.f2o
    }

    /// Replaces the field-to-output map. Particles keep their field-space
    /// positions.
    pub fn set_transform(&mut self, f2o: RigidTransform) {
        self.f2o = f2o;
    }

    /// Points, in field space, where every streamline stops.
    pub fn set_singularities(&mut self, points: Vec<DVec2>) {
        self.flic.set_singularities(points);
    }

    pub fn add_singularity(&mut self, p: DVec2) {
        self.flic.add_singularity(p);
    }

    pub fn clear_singularities(&mut self) {
        self.flic.clear_singularities();
    }

    /// The last rendered frame.
    pub fn output(&self) -> &AccumImage {
        &self.output
    }

    /// The padded input texture of the last frame.
    pub fn input(&self) -> &AccumImage {
        &self.input
    }

    pub fn particles(&self) -> &ParticleArena {
        &self.arena
    }

    pub fn particle_count(&self) -> usize {
        self.arena.len()
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Resizes the input to `output + 2 * pad` on each axis, reusing the
    /// buffer when the size is unchanged.
    fn prepare_input(&mut self, pad: usize) -> Result<(), FlowError> {
        let w = self.output.width() + 2 * pad;
        let h = self.output.height() + 2 * pad;
        if self.input.width() == w && self.input.height() == h {
            self.input.clear();
        } else {
            self.input = AccumImage::new(w, h)?;
        }
        Ok(())
    }

    /// Renders the current frame into the output image.
    pub fn compute(&mut self) -> Result<FrameStats, FlowError> {
        let params = self.params;
        params.validate()?;
        let pad = padding(&params);
        self.prepare_input(pad)?;
        let f2o = self.f2o;
        let f2i = f2o.translated(DVec2::splat(pad as f64));
        let i2f = f2i.inverted();
        self.arena.reserve_total(self.input.len() * PARTICLES_PER_PIXEL)?;

        let mut stats = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };
        let input = &mut self.input;

        stats.dropped_outside = self.arena.retain_current(|p| {
            let ip = f2i.forward(p.position);
            if input.contains_point(ip) {
                input.accumulate_bilinear(ip, p.intensity);
                true
            } else {
                false
            }
        });
        stats.thinned = self.arena.retain_current(|p| {
            let ip = f2i.forward(p.position);
            input.weight(round(ip.x), round(ip.y)) <= params.overcrowded_weight
        });

        for p in RasterGrid::new(input.width(), input.height()) {
            let (x, y) = (p.x as i64, p.y as i64);
            let weight = input.weight(x, y);
            if weight < params.undercovered_weight {
                let jittered = p + DVec2::new(
                    self.rng.next_range(-params.jitter, params.jitter),
                    self.rng.next_range(-params.jitter, params.jitter),
                );
                let intensity = self.rng.next_signed();
                self.arena.insert(i2f.forward(jittered), intensity)?;
                input.accumulate_bilinear(jittered, intensity);
                stats.injected += 1;
            } else if weight > params.overcrowded_weight {
                let value = input.value(x, y).unwrap_or(0.0);
                self.arena.insert(i2f.forward(p), value)?;
                stats.representatives += 1;
            }
        }
        self.arena.merge_new(&mut self.rng);

        input.normalize();
        for _ in 0..params.filter_repeat {
            input.convolve3x3(&params.filter_kernel);
        }

        self.flic.set_params(params.flic)?;
        let seeds = self.arena.iter_current().map(|p| f2o.forward(p.position));
        stats.flic = self.flic.compute_seeded(
            self.input.values(),
            &self.field,
            &mut self.output,
            &f2i,
            &f2o,
            seeds,
        )?;
        stats.particles = self.arena.len();

        debug!(
            "DFLIC frame {}: {} dropped outside, {} thinned, {} injected, {} representatives",
            stats.frame, stats.dropped_outside, stats.thinned, stats.injected, stats.representatives
        );
        info!(
            "DFLIC frame {} rendered: {} particles, {} streams",
            stats.frame,
            stats.particles,
            stats.flic.fast_streams + stats.flic.fill_streams
        );
        self.frame += 1;
        Ok(stats)
    }

    /// Advects the particles by `dt` in one Euler step per `dt`.
    pub fn evolve(&mut self, dt: f64) -> Result<(), FlowError> {
        self.evolve_with_step(dt, dt)
    }

    /// Advects the particles through the motion field by `dt`, in explicit
    /// Euler steps no longer than `max_step`. A non-positive `dt` does
    /// nothing; a NaN or infinite `dt` is `InvalidParameter`.
    pub fn evolve_with_step(&mut self, dt: f64, max_step: f64) -> Result<(), FlowError> {
        if !dt.is_finite() {
            return Err(FlowError::invalid("dt", "must be finite"));
        }
        if dt <= 0.0 {
            return Ok(());
        }
        if !(max_step > 0.0 && max_step.is_finite()) {
            return Err(FlowError::invalid("max_step", "must be positive"));
        }
        let motion = &self.motion;
        let mut remaining = dt;
        while remaining > 0.0 {
            let h = remaining.min(max_step);
            remaining -= h;
            self.arena.advect_current(|p| euler(motion, p, h));
        }
        Ok(())
    }
}
