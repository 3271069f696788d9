//! Fast line integral convolution.
//!
//! Every output pixel receives the box-filtered average of the input noise
//! along the streamline through it. Instead of convolving once per pixel,
//! each seed's streamline is walked once while a window of samples slides
//! along it: one sample enters at the leading edge, one leaves at the
//! trailing edge, and the window sum is deposited at the window centre. The
//! cost per output sample is constant regardless of kernel width.
//!
//! Seeding runs in two phases. Block-random (or caller-supplied) seeds are
//! consumed until a large share of the output is covered, then a raster
//! sweep tops up every pixel still under `min_coverage`.

use glam::DVec2;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::FlicParams;
use crate::contrib::Contributions;
use crate::error::FlowError;
use crate::grid::{BlockRandomGrid, RasterGrid};
use crate::image::{AccumImage, ScalarImage};
use crate::prng::Xorshift64;
use crate::streamline::Streamline;
use crate::transform::RigidTransform;
use crate::vector::VectorField;

/// Extra arc length past the nominal half-length so the last sample is not
/// lost to rounding.
const LENGTH_SLACK: f64 = 1e-3;

/// Summary of one FLIC run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlicStats {
    /// Streams computed from phase-one seeds.
    pub fast_streams: usize,
    /// Phase-one seeds skipped as off-image, already saturated, or unsampled.
    pub skipped_seeds: usize,
    /// Covered pixels when phase one ended.
    pub coverage_at_switch: usize,
    /// Streams computed by the raster fill.
    pub fill_streams: usize,
    /// Pixels the fill could not bring to `min_coverage`.
    pub uncoverable: usize,
}

/// FLIC engine state reused across runs: parameters, singularities, the
/// random source for seed ordering, and the sample and weight buffers.
pub struct Flic {
    params: FlicParams,
    singularities: Vec<DVec2>,
    rng: Xorshift64,
    samples: Vec<f64>,
    positions: Vec<DVec2>,
    contrib: Contributions,
}

impl Flic {
    /// Returns `FlowError::InvalidParameter` if `params` does not validate.
    pub fn new(params: FlicParams, rng: Xorshift64) -> Result<Self, FlowError> {
        params.validate()?;
        Ok(Self {
            params,
            singularities: Vec::new(),
            rng,
            samples: Vec::new(),
            positions: Vec::new(),
            contrib: Contributions::new(2),
        })
    }

    pub fn params(&self) -> &FlicParams {
        &self.params
    }

    pub fn set_params(&mut self, params: FlicParams) -> Result<(), FlowError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Replaces the random source used to order phase-one seeds.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Xorshift64::new(seed);
    }

    /// Points, in field space, where every streamline stops.
    pub fn singularities(&self) -> &[DVec2] {
        &self.singularities
    }

    pub fn set_singularities(&mut self, points: Vec<DVec2>) {
        self.singularities = points;
    }

    pub fn add_singularity(&mut self, p: DVec2) {
        self.singularities.push(p);
    }

    pub fn clear_singularities(&mut self) {
        self.singularities.clear();
    }

    /// Renders `field` into `output`, seeding phase one in block-random order.
    ///
    /// `f2i` and `f2o` map field space to input and output pixels.
    pub fn compute<F: VectorField + ?Sized>(
        &mut self,
        input: &ScalarImage,
        field: &F,
        output: &mut AccumImage,
        f2i: &RigidTransform,
        f2o: &RigidTransform,
    ) -> Result<FlicStats, FlowError> {
        let seeds = BlockRandomGrid::new(output.width(), output.height(), self.rng.fork());
        self.compute_seeded(input, field, output, f2i, f2o, seeds)
    }

    /// Renders `field` into `output`, taking phase-one seeds (in output
    /// pixels) from `seeds`.
    pub fn compute_seeded<F, I>(
        &mut self,
        input: &ScalarImage,
        field: &F,
        output: &mut AccumImage,
        f2i: &RigidTransform,
        f2o: &RigidTransform,
        seeds: I,
    ) -> Result<FlicStats, FlowError>
    where
        F: VectorField + ?Sized,
        I: IntoIterator<Item = DVec2>,
    {
        let params = self.params;
        params.validate()?;

        if params.clear {
            output.clear();
        }
        output.set_min_weight(params.min_coverage);

        let mut pass = Pass::new(self, input, field, output, f2i, f2o);
        let mut stats = FlicStats::default();
        let pixels = pass.output.len();
        let target = (params.fast_phase_fraction * pixels as f64).ceil() as usize;
        info!(
            "FLIC: {}x{} output, kernel {} px, fast phase until {target} of {pixels} pixels covered",
            pass.output.width(),
            pass.output.height(),
            params.stream_len
        );

        pass.set_length(pass.fast_len);
        for seed in seeds {
            if pass.output.coverage() >= target {
                break;
            }
            if pass.compute_stream(seed) {
                stats.fast_streams += 1;
            } else {
                stats.skipped_seeds += 1;
            }
        }
        stats.coverage_at_switch = pass.output.coverage();
        debug!(
            "FLIC fast phase: {} streams, {} seeds skipped, {} pixels covered",
            stats.fast_streams, stats.skipped_seeds, stats.coverage_at_switch
        );

        info!("FLIC: filling remaining pixels");
        pass.set_length(pass.fill_len);
        let (w, h) = (pass.output.width(), pass.output.height());
        for p in RasterGrid::new(w, h) {
            let (x, y) = (p.x as i64, p.y as i64);
            while pass.output.weight(x, y) < params.min_coverage {
                let before = pass.output.weight(x, y);
                let ran = pass.compute_stream(p);
                if ran {
                    stats.fill_streams += 1;
                }
                if !ran || pass.output.weight(x, y) <= before {
                    stats.uncoverable += 1;
                    break;
                }
            }
        }
        debug!("FLIC fill phase: {} streams", stats.fill_streams);
        if stats.uncoverable > 0 {
            warn!(
                "FLIC: {} pixels could not reach coverage {} (seed outside the input image)",
                stats.uncoverable, params.min_coverage
            );
        }

        if params.normalize {
            output.normalize();
        }
        Ok(stats)
    }
}

#[inline]
fn round(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Borrowed state for one run: the images, transforms, both tracers and
/// the engine's scratch buffers.
struct Pass<'a, F: ?Sized> {
    input: &'a ScalarImage,
    output: &'a mut AccumImage,
    f2i: RigidTransform,
    o2f: RigidTransform,
    i2o: RigidTransform,
    fwd: Streamline<'a, F>,
    bwd: Streamline<'a, F>,
    samples: &'a mut [f64],
    positions: &'a mut [DVec2],
    contrib: &'a mut Contributions,
    /// Samples on each side of the window centre.
    n: isize,
    /// Buffer index of the seed sample.
    offset: isize,
    step: f64,
    max_coverage: f64,
    /// Half-length traced from each seed in phase one.
    fast_len: f64,
    /// Half-length traced from each seed in the fill phase.
    fill_len: f64,
    cur_len: f64,
}

impl<'a, F: VectorField + ?Sized> Pass<'a, F> {
    fn new(
        flic: &'a mut Flic,
        input: &'a ScalarImage,
        field: &'a F,
        output: &'a mut AccumImage,
        f2i: &RigidTransform,
        f2o: &RigidTransform,
    ) -> Self {
        let Flic {
            params,
            singularities,
            samples,
            positions,
            contrib,
            ..
        } = flic;
        let o2f = f2o.inverted();
        let to_field = o2f.scale();
        let stream_len = to_field * params.stream_len;
        let step = to_field * params.step_size;
        let max_len = to_field * params.effective_max_len();
        let fast_len = 0.5 * max_len + LENGTH_SLACK;
        let fill_len = 0.5 * stream_len + LENGTH_SLACK;

        let n = (0.5 * stream_len / step).floor() as isize;
        let offset = (fast_len / step).floor() as isize + 2;
        let len = 2 * offset as usize + 1;
        samples.resize(len, 0.0);
        positions.resize(len, DVec2::ZERO);

        let contrib_size = (f2i.scale() * stream_len).ceil() as usize + 2;
        if contrib.size() == contrib_size {
            contrib.clear();
        } else {
            *contrib = Contributions::new(contrib_size);
        }

        let tracer = params.tracer.scaled(to_field);
        let singularities: &'a [DVec2] = singularities;
        Self {
            input,
            output,
            f2i: *f2i,
            o2f,
            i2o: f2i.inverted().then(f2o),
            fwd: Streamline::new(field, step, tracer, singularities),
            bwd: Streamline::new(field, step, tracer, singularities),
            samples: samples.as_mut_slice(),
            positions: positions.as_mut_slice(),
            contrib,
            n,
            offset,
            step,
            max_coverage: params.max_coverage,
            fast_len,
            fill_len,
            cur_len: fast_len,
        }
    }

    fn set_length(&mut self, len: f64) {
        self.cur_len = len;
    }

    /// Samples the input at field point `fp`, recording it at buffer slot
    /// `k`. `None` if `fp` maps outside the input.
    #[inline]
    fn take(&mut self, k: isize, fp: DVec2) -> Option<f64> {
        let ip = self.f2i.forward(fp);
        let s = self.input.sample_bilinear(ip)?;
        self.samples[k as usize] = s;
        self.positions[k as usize] = ip;
        self.contrib.add(ip);
        Some(s)
    }

    #[inline]
    fn drop_sample(&mut self, k: isize) -> f64 {
        self.contrib.remove(self.positions[k as usize]);
        self.samples[k as usize]
    }

    #[inline]
    fn deposit(&mut self, k: isize, total: f64) {
        let op = self.i2o.forward(self.positions[k as usize]);
        self.output.accumulate_bilinear(op, self.contrib.rescale(total));
    }

    fn clear_range(&mut self, lo: isize, hi: isize) {
        for k in lo..=hi {
            self.contrib.clear_at(self.positions[k as usize]);
        }
    }

    /// Convolves along the streamline through output point `p0`.
    ///
    /// Returns `false` without touching the output if `p0` is off the
    /// output, its pixel is already at `max_coverage`, or its field point
    /// maps outside the input.
    fn compute_stream(&mut self, p0: DVec2) -> bool {
        if !self.output.contains_point(p0) {
            return false;
        }
        if self.output.weight(round(p0.x), round(p0.y)) >= self.max_coverage {
            return false;
        }

        let f0 = self.o2f.forward(p0);
        self.fwd.start(f0, self.cur_len);
        self.bwd.start(f0, -self.cur_len);
        let (n, off) = (self.n, self.offset);

        // Centred window: the seed and n samples forward...
        let mut total = 0.0;
        let mut i = off;
        while i <= off + n {
            let Some(fp) = self.fwd.next() else { break };
            match self.take(i, fp) {
                Some(s) => {
                    total += s;
                    i += 1;
                }
                None => {
                    self.fwd.stop();
                    break;
                }
            }
        }
        let mut smax = i - 1;
        if smax < off {
            return false;
        }

        // ...and n samples backward, skipping the shared seed.
        self.bwd.next();
        let mut i = off - 1;
        while i >= off - n {
            let Some(fp) = self.bwd.next() else { break };
            match self.take(i, fp) {
                Some(s) => {
                    total += s;
                    i -= 1;
                }
                None => {
                    self.bwd.stop();
                    break;
                }
            }
        }
        let mut smin = i + 1;
        self.deposit(off, total);

        let m = (self.cur_len / self.step).floor() as isize - n;
        if m > 0 && (!self.fwd.is_stopped() || !self.bwd.is_stopped()) {
            if !self.fwd.is_stopped() {
                let mut i = off + 1;
                while i <= off + m && i <= smax {
                    if i - n - 1 >= smin {
                        total -= self.drop_sample(i - n - 1);
                    }
                    if let Some(fp) = self.fwd.next() {
                        match self.take(i + n, fp) {
                            Some(s) => {
                                total += s;
                                smax = i + n;
                            }
                            None => self.fwd.stop(),
                        }
                    }
                    self.deposit(i, total);
                    i += 1;
                }
                self.clear_range((i - n - 1).max(smin), smax);
                self.contrib.reset_sum();

                // Rebuild the centred window for the backward walk.
                if !self.bwd.is_stopped() {
                    total = 0.0;
                    for k in (off - n).max(smin)..=(off + n).min(smax) {
                        total += self.samples[k as usize];
                        self.contrib.add(self.positions[k as usize]);
                    }
                }
            }

            if !self.bwd.is_stopped() {
                let mut i = off - 1;
                while i >= off - m && i >= smin {
                    if i + n + 1 <= smax {
                        total -= self.drop_sample(i + n + 1);
                    }
                    if let Some(fp) = self.bwd.next() {
                        match self.take(i - n, fp) {
                            Some(s) => {
                                total += s;
                                smin = i - n;
                            }
                            None => self.bwd.stop(),
                        }
                    }
                    self.deposit(i, total);
                    i -= 1;
                }
                self.clear_range(smin, (i + n + 1).min(smax));
            }
        } else {
            self.clear_range(smin, smax);
        }
        self.contrib.reset_sum();
        true
    }
}
