//! Tunable parameters for the tracer, FLIC and DFLIC, and the lenient JSON
//! helpers used to read them.
//!
//! The `param_*` helpers take a JSON value, a key name, and a default. If
//! the key is missing or the value is not the expected type, the default is
//! returned. Range checks happen separately in each `validate()`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::FlowError;

/// Extracts an `f64` from `params[name]`, returning `default` if missing or wrong type.
///
/// Accepts both JSON numbers (including integers) and converts them to f64.
pub fn param_f64(params: &Value, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

/// Like [`param_f64`] for optional values: an explicit `null` yields `None`.
pub fn param_opt_f64(params: &Value, name: &str, default: Option<f64>) -> Option<f64> {
    match params.get(name) {
        Some(Value::Null) => None,
        Some(v) => v.as_f64().or(default),
        None => default,
    }
}

/// Extracts a `usize` from `params[name]`, returning `default` if missing or wrong type.
///
/// Only succeeds if the JSON value is a non-negative integer that fits in `u64`.
pub fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

/// Extracts a `u32` from `params[name]`, returning `default` if missing, of
/// the wrong type, or out of range.
pub fn param_u32(params: &Value, name: &str, default: u32) -> u32 {
    params
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
}

/// Extracts a `bool` from `params[name]`, returning `default` if missing or wrong type.
pub fn param_bool(params: &Value, name: &str, default: bool) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn ensure(ok: bool, name: &str, reason: &str) -> Result<(), FlowError> {
    if ok {
        Ok(())
    } else {
        Err(FlowError::invalid(name, reason))
    }
}

const DEFAULT_MIN_STEP: f64 = 0.1;
const DEFAULT_MAX_STEP: f64 = 10.0;
const DEFAULT_TOLERANCE: f64 = 0.05;
const DEFAULT_SAFETY: f64 = 0.99;

const DEFAULT_STEP_SIZE: f64 = 0.5;
const DEFAULT_MIN_COVERAGE: f64 = 1.0;
const DEFAULT_MAX_COVERAGE: f64 = 3.0;
const DEFAULT_FAST_PHASE_FRACTION: f64 = 0.95;
/// Kernel width used by `Default`, matching a 128 pixel output.
const DEFAULT_STREAM_LEN: f64 = 16.0;
const FLIC_MAX_LEN_FACTOR: f64 = 8.0;
const DFLIC_MAX_LEN_FACTOR: f64 = 4.0;

const DEFAULT_UNDERCOVERED: f64 = 0.5;
const DEFAULT_OVERCROWDED: f64 = 2.0;
const DEFAULT_JITTER: f64 = 0.25;

/// 3x3 binomial low-pass, no offset.
pub const DEFAULT_INPUT_FILTER: [f64; 10] = [
    0.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 4.0,
    1.0 / 8.0,
    1.0 / 16.0,
    1.0 / 8.0,
    1.0 / 16.0,
];

/// Adaptive RK4 settings for streamline tracing.
///
/// Lengths are in output image pixels when held by [`FlicParams`]; FLIC
/// converts them to field units before tracing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracerParams {
    /// Smallest trial step before a trace gives up.
    pub min_step: f64,
    /// Largest integration step.
    pub max_step: f64,
    /// Allowed position error per step.
    pub tolerance: f64,
    /// Step-size controller safety factor.
    pub safety: f64,
    /// Distance from a singularity at which traces stop. `None` means one
    /// sample spacing.
    pub singularity_radius: Option<f64>,
}

impl Default for TracerParams {
    fn default() -> Self {
        Self {
            min_step: DEFAULT_MIN_STEP,
            max_step: DEFAULT_MAX_STEP,
            tolerance: DEFAULT_TOLERANCE,
            safety: DEFAULT_SAFETY,
            singularity_radius: None,
        }
    }
}

impl TracerParams {
    pub fn from_json(params: &Value) -> Self {
        Self::from_json_with(params, &Self::default())
    }

    /// Reads overrides from `params`, falling back to `d`.
    pub fn from_json_with(params: &Value, d: &Self) -> Self {
        Self {
            min_step: param_f64(params, "min_step", d.min_step),
            max_step: param_f64(params, "max_step", d.max_step),
            tolerance: param_f64(params, "tolerance", d.tolerance),
            safety: param_f64(params, "safety", d.safety),
            singularity_radius: param_opt_f64(params, "singularity_radius", d.singularity_radius),
        }
    }

    /// The same settings with every length multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            min_step: self.min_step * factor,
            max_step: self.max_step * factor,
            tolerance: self.tolerance * factor,
            safety: self.safety,
            singularity_radius: self.singularity_radius.map(|r| r * factor),
        }
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        ensure(self.min_step > 0.0, "min_step", "must be positive")?;
        ensure(self.max_step >= self.min_step, "max_step", "must be at least min_step")?;
        ensure(self.tolerance > 0.0, "tolerance", "must be positive")?;
        ensure(
            self.safety > 0.0 && self.safety <= 1.0,
            "safety",
            "must be in (0, 1]",
        )?;
        if let Some(r) = self.singularity_radius {
            ensure(r >= 0.0, "singularity_radius", "must not be negative")?;
        }
        Ok(())
    }

    pub fn param_schema() -> Value {
        json!({
            "min_step": {
                "type": "number",
                "default": DEFAULT_MIN_STEP,
                "min": 0.0,
                "description": "Smallest RK4 step before a streamline is abandoned (pixels)"
            },
            "max_step": {
                "type": "number",
                "default": DEFAULT_MAX_STEP,
                "min": 0.0,
                "description": "Largest RK4 step (pixels)"
            },
            "tolerance": {
                "type": "number",
                "default": DEFAULT_TOLERANCE,
                "min": 0.0,
                "description": "Allowed position error per step (pixels)"
            },
            "safety": {
                "type": "number",
                "default": DEFAULT_SAFETY,
                "min": 0.0,
                "max": 1.0,
                "description": "Step-size controller safety factor"
            },
            "singularity_radius": {
                "type": "number",
                "default": null,
                "min": 0.0,
                "description": "Exclusion radius around singularities (pixels); null for one step"
            }
        })
    }
}

/// Settings for one FLIC pass. Lengths are in output image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlicParams {
    /// Width of the box kernel.
    pub stream_len: f64,
    /// Spacing between samples along a streamline.
    pub step_size: f64,
    /// Longest streamline followed from one seed; never less than `stream_len`.
    pub max_len: f64,
    /// Weight at which an output pixel counts as covered.
    pub min_coverage: f64,
    /// Seeds on pixels at least this heavily weighted are skipped. A
    /// heuristic, not a cap.
    pub max_coverage: f64,
    /// Share of covered pixels at which random seeding hands over to the
    /// raster fill.
    pub fast_phase_fraction: f64,
    /// Divide weights out of the output when done.
    pub normalize: bool,
    /// Clear the output before rendering.
    pub clear: bool,
    pub tracer: TracerParams,
}

impl Default for FlicParams {
    fn default() -> Self {
        Self::with_stream_len(DEFAULT_STREAM_LEN, FLIC_MAX_LEN_FACTOR)
    }
}

impl FlicParams {
    fn with_stream_len(stream_len: f64, max_len_factor: f64) -> Self {
        Self {
            stream_len,
            step_size: DEFAULT_STEP_SIZE,
            max_len: stream_len * max_len_factor,
            min_coverage: DEFAULT_MIN_COVERAGE,
            max_coverage: DEFAULT_MAX_COVERAGE,
            fast_phase_fraction: DEFAULT_FAST_PHASE_FRACTION,
            normalize: true,
            clear: true,
            tracer: TracerParams::default(),
        }
    }

    /// Defaults for a `width x height` output: a kernel one eighth of the
    /// larger side and streamlines up to eight kernels long.
    pub fn for_output(width: usize, height: usize) -> Self {
        let stream_len = ((width.max(height) / 8) as f64).max(1.0);
        Self::with_stream_len(stream_len, FLIC_MAX_LEN_FACTOR)
    }

    /// Reads overrides from `params`, falling back to `defaults`.
    pub fn from_json_with(params: &Value, defaults: &Self) -> Self {
        let stream_len = param_f64(params, "stream_len", defaults.stream_len);
        // A kernel override without a length override keeps the length ratio.
        let max_len_default = if defaults.stream_len > 0.0 {
            defaults.max_len / defaults.stream_len * stream_len
        } else {
            defaults.max_len
        };
        Self {
            stream_len,
            step_size: param_f64(params, "step_size", defaults.step_size),
            max_len: param_f64(params, "max_len", max_len_default),
            min_coverage: param_f64(params, "min_coverage", defaults.min_coverage),
            max_coverage: param_f64(params, "max_coverage", defaults.max_coverage),
            fast_phase_fraction: param_f64(params, "fast_phase_fraction", defaults.fast_phase_fraction),
            normalize: param_bool(params, "normalize", defaults.normalize),
            clear: param_bool(params, "clear", defaults.clear),
            tracer: TracerParams::from_json_with(params, &defaults.tracer),
        }
    }

    /// Reads overrides from `params` over the defaults for a `width x height` output.
    pub fn from_json(params: &Value, width: usize, height: usize) -> Self {
        Self::from_json_with(params, &Self::for_output(width, height))
    }

    /// `max_len`, floored to the kernel width.
    pub fn effective_max_len(&self) -> f64 {
        self.max_len.max(self.stream_len)
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        ensure(
            self.stream_len.is_finite() && self.stream_len > 0.0,
            "stream_len",
            "must be positive",
        )?;
        ensure(
            self.step_size.is_finite() && self.step_size > 0.0,
            "step_size",
            "must be positive",
        )?;
        ensure(self.max_len.is_finite(), "max_len", "must be finite")?;
        ensure(self.min_coverage > 0.0, "min_coverage", "must be positive")?;
        ensure(
            self.max_coverage >= self.min_coverage,
            "max_coverage",
            "must be at least min_coverage",
        )?;
        ensure(
            (0.0..=1.0).contains(&self.fast_phase_fraction),
            "fast_phase_fraction",
            "must be in [0, 1]",
        )?;
        self.tracer.validate()
    }

    pub fn param_schema() -> Value {
        let mut schema = json!({
            "stream_len": {
                "type": "number",
                "default": "max(width, height) / 8",
                "min": 0.0,
                "description": "Convolution kernel width (pixels)"
            },
            "step_size": {
                "type": "number",
                "default": DEFAULT_STEP_SIZE,
                "min": 0.0,
                "description": "Sample spacing along streamlines (pixels)"
            },
            "max_len": {
                "type": "number",
                "default": "8 * stream_len",
                "min": 0.0,
                "description": "Longest streamline followed from one seed (pixels)"
            },
            "min_coverage": {
                "type": "number",
                "default": DEFAULT_MIN_COVERAGE,
                "min": 0.0,
                "description": "Weight at which an output pixel is complete"
            },
            "max_coverage": {
                "type": "number",
                "default": DEFAULT_MAX_COVERAGE,
                "min": 0.0,
                "description": "Seeds on pixels this heavily covered are skipped"
            },
            "fast_phase_fraction": {
                "type": "number",
                "default": DEFAULT_FAST_PHASE_FRACTION,
                "min": 0.0,
                "max": 1.0,
                "description": "Covered share at which random seeding stops"
            },
            "normalize": {
                "type": "boolean",
                "default": true,
                "description": "Divide accumulated weights out of the result"
            },
            "clear": {
                "type": "boolean",
                "default": true,
                "description": "Clear the output before rendering"
            }
        });
        merge(&mut schema, TracerParams::param_schema());
        schema
    }
}

/// Settings for the particle layer plus the FLIC pass it drives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DflicParams {
    pub flic: FlicParams,
    /// Input pixels lighter than this receive a fresh particle.
    pub undercovered_weight: f64,
    /// Input pixels heavier than this are thinned to one representative.
    pub overcrowded_weight: f64,
    /// Half-width of the uniform offset applied to fresh particles (input pixels).
    pub jitter: f64,
    /// Low-pass kernel applied to the input, `[offset, 3x3 weights...]`.
    pub filter_kernel: [f64; 10],
    /// Number of times the low-pass is applied.
    pub filter_repeat: usize,
}

impl Default for DflicParams {
    fn default() -> Self {
        Self::with_flic(FlicParams::with_stream_len(DEFAULT_STREAM_LEN, DFLIC_MAX_LEN_FACTOR))
    }
}

impl DflicParams {
    fn with_flic(flic: FlicParams) -> Self {
        Self {
            flic,
            undercovered_weight: DEFAULT_UNDERCOVERED,
            overcrowded_weight: DEFAULT_OVERCROWDED,
            jitter: DEFAULT_JITTER,
            filter_kernel: DEFAULT_INPUT_FILTER,
            filter_repeat: 0,
        }
    }

    /// Defaults for a `width x height` output: a kernel one eighth of the
    /// diagonal, truncated to whole pixels, and streamlines up to four
    /// kernels long.
    pub fn for_output(width: usize, height: usize) -> Self {
        let (w, h) = (width as f64, height as f64);
        let stream_len = ((w * w + h * h).sqrt() / 8.0).floor().max(1.0);
        Self::with_flic(FlicParams::with_stream_len(stream_len, DFLIC_MAX_LEN_FACTOR))
    }

    /// Reads overrides from `params` over the defaults for a `width x height` output.
    ///
    /// `filter_kernel` is accepted as an array of exactly ten numbers.
    pub fn from_json(params: &Value, width: usize, height: usize) -> Self {
        let d = Self::for_output(width, height);
        let filter_kernel = params
            .get("filter_kernel")
            .and_then(Value::as_array)
            .filter(|a| a.len() == 10)
            .and_then(|a| {
                let mut k = [0.0; 10];
                for (slot, v) in k.iter_mut().zip(a) {
                    *slot = v.as_f64()?;
                }
                Some(k)
            })
            .unwrap_or(d.filter_kernel);
        Self {
            flic: FlicParams::from_json_with(params, &d.flic),
            undercovered_weight: param_f64(params, "undercovered_weight", d.undercovered_weight),
            overcrowded_weight: param_f64(params, "overcrowded_weight", d.overcrowded_weight),
            jitter: param_f64(params, "jitter", d.jitter),
            filter_kernel,
            filter_repeat: param_usize(params, "filter_repeat", d.filter_repeat),
        }
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        self.flic.validate()?;
        ensure(
            self.undercovered_weight >= 0.0,
            "undercovered_weight",
            "must not be negative",
        )?;
        ensure(
            self.overcrowded_weight > self.undercovered_weight,
            "overcrowded_weight",
            "must exceed undercovered_weight",
        )?;
        ensure(
            (0.0..0.5).contains(&self.jitter),
            "jitter",
            "must be in [0, 0.5)",
        )?;
        ensure(
            self.filter_kernel.iter().all(|c| c.is_finite()),
            "filter_kernel",
            "must be finite",
        )
    }

    pub fn param_schema() -> Value {
        let mut schema = FlicParams::param_schema();
        schema["stream_len"]["default"] = json!("floor(sqrt(width^2 + height^2) / 8)");
        schema["max_len"]["default"] = json!("4 * stream_len");
        merge(
            &mut schema,
            json!({
                "undercovered_weight": {
                    "type": "number",
                    "default": DEFAULT_UNDERCOVERED,
                    "min": 0.0,
                    "description": "Input pixels below this weight get a new particle"
                },
                "overcrowded_weight": {
                    "type": "number",
                    "default": DEFAULT_OVERCROWDED,
                    "min": 0.0,
                    "description": "Input pixels above this weight are thinned"
                },
                "jitter": {
                    "type": "number",
                    "default": DEFAULT_JITTER,
                    "min": 0.0,
                    "max": 0.5,
                    "description": "Random offset of new particles (input pixels)"
                },
                "filter_kernel": {
                    "type": "array",
                    "default": DEFAULT_INPUT_FILTER.to_vec(),
                    "description": "Input low-pass: constant offset then 3x3 weights"
                },
                "filter_repeat": {
                    "type": "integer",
                    "default": 0,
                    "min": 0,
                    "description": "Number of low-pass passes over the input"
                }
            }),
        );
        schema
    }
}

fn merge(into: &mut Value, from: Value) {
    if let (Some(dst), Value::Object(src)) = (into.as_object_mut(), from) {
        dst.extend(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- param helpers --

    #[test]
    fn param_f64_extracts_integer_as_float() {
        let params = json!({"count": 10});
        assert!((param_f64(&params, "count", 0.0) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn param_f64_returns_default_when_wrong_type() {
        let params = json!({"speed": "fast"});
        assert!((param_f64(&params, "speed", 1.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn param_opt_f64_distinguishes_null_from_missing() {
        let params = json!({"r": null, "s": 2.0});
        assert_eq!(param_opt_f64(&params, "r", Some(1.0)), None);
        assert_eq!(param_opt_f64(&params, "s", None), Some(2.0));
        assert_eq!(param_opt_f64(&params, "t", Some(3.0)), Some(3.0));
    }

    #[test]
    fn param_usize_returns_default_for_negative_integer() {
        let params = json!({"count": -1});
        assert_eq!(param_usize(&params, "count", 5), 5);
    }

    #[test]
    fn param_bool_returns_default_for_wrong_type() {
        let params = json!({"enabled": 1});
        assert!(!param_bool(&params, "enabled", false));
    }

    #[test]
    fn param_u32_rejects_out_of_range() {
        let params = json!({ "seed": 7, "big": 5_000_000_000_u64, "neg": -1 });
        assert_eq!(param_u32(&params, "seed", 1), 7);
        assert_eq!(param_u32(&params, "big", 1), 1);
        assert_eq!(param_u32(&params, "neg", 1), 1);
        assert_eq!(param_u32(&params, "missing", 3), 3);
    }

    // -- Defaults --

    #[test]
    fn tracer_defaults() {
        let t = TracerParams::default();
        assert_eq!(t.min_step, 0.1);
        assert_eq!(t.max_step, 10.0);
        assert_eq!(t.tolerance, 0.05);
        assert_eq!(t.safety, 0.99);
        assert_eq!(t.singularity_radius, None);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn flic_kernel_is_an_eighth_of_the_larger_side() {
        let p = FlicParams::for_output(640, 480);
        assert_eq!(p.stream_len, 80.0);
        assert_eq!(p.max_len, 640.0);
        assert_eq!(p.step_size, 0.5);
        assert!(p.normalize && p.clear);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn dflic_kernel_is_an_eighth_of_the_diagonal() {
        let p = DflicParams::for_output(300, 400);
        assert_eq!(p.flic.stream_len, 62.0);
        assert_eq!(p.flic.max_len, 248.0);
        assert_eq!(p.filter_kernel, DEFAULT_INPUT_FILTER);
        assert_eq!(p.filter_repeat, 0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn default_filter_sums_to_one() {
        let total: f64 = DEFAULT_INPUT_FILTER[1..].iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn max_len_is_floored_to_kernel() {
        let p = FlicParams {
            max_len: 2.0,
            ..FlicParams::for_output(64, 64)
        };
        assert_eq!(p.effective_max_len(), 8.0);
    }

    // -- JSON --

    #[test]
    fn from_json_overrides_and_keeps_ratio() {
        let p = FlicParams::from_json(&json!({"stream_len": 10, "tolerance": 0.2}), 64, 64);
        assert_eq!(p.stream_len, 10.0);
        assert_eq!(p.max_len, 80.0);
        assert_eq!(p.tracer.tolerance, 0.2);
    }

    #[test]
    fn from_json_ignores_garbage() {
        let p = DflicParams::from_json(&json!({"jitter": "lots", "filter_kernel": [1, 2]}), 64, 64);
        assert_eq!(p, DflicParams::for_output(64, 64));
    }

    #[test]
    fn dflic_reads_filter_kernel() {
        let k = json!([0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
        let p = DflicParams::from_json(&json!({"filter_kernel": k, "filter_repeat": 2}), 64, 64);
        assert_eq!(p.filter_kernel[5], 1.0);
        assert_eq!(p.filter_repeat, 2);
    }

    #[test]
    fn serde_roundtrip() {
        let p = DflicParams::for_output(100, 50);
        let text = serde_json::to_string(&p).unwrap();
        let back: DflicParams = serde_json::from_str(&text).unwrap();
        assert_eq!(p, back);
    }

    // -- Validation --

    #[test]
    fn validate_rejects_bad_values() {
        let base = FlicParams::for_output(64, 64);
        let cases = [
            ("stream_len", FlicParams { stream_len: 0.0, ..base }),
            ("step_size", FlicParams { step_size: -1.0, ..base }),
            ("min_coverage", FlicParams { min_coverage: 0.0, ..base }),
            ("max_coverage", FlicParams { max_coverage: 0.5, ..base }),
            ("fast_phase_fraction", FlicParams { fast_phase_fraction: 1.5, ..base }),
        ];
        for (name, p) in cases {
            match p.validate() {
                Err(FlowError::InvalidParameter { name: n, .. }) => assert_eq!(n, name),
                other => panic!("{name}: expected InvalidParameter, got {other:?}"),
            }
        }
    }

    #[test]
    fn validate_checks_tracer_and_particles() {
        let mut p = DflicParams::for_output(64, 64);
        p.flic.tracer.safety = 0.0;
        assert!(p.validate().is_err());
        let mut p = DflicParams::for_output(64, 64);
        p.overcrowded_weight = 0.25;
        assert!(p.validate().is_err());
        let mut p = DflicParams::for_output(64, 64);
        p.jitter = 0.75;
        assert!(p.validate().is_err());
    }

    #[test]
    fn schemas_describe_every_field() {
        let schema = DflicParams::param_schema();
        for key in [
            "stream_len",
            "step_size",
            "max_len",
            "min_coverage",
            "max_coverage",
            "fast_phase_fraction",
            "normalize",
            "clear",
            "min_step",
            "max_step",
            "tolerance",
            "safety",
            "singularity_radius",
            "undercovered_weight",
            "overcrowded_weight",
            "jitter",
            "filter_kernel",
            "filter_repeat",
        ] {
            assert!(schema.get(key).is_some(), "schema missing parameter: {key}");
            assert!(schema[key].get("description").is_some(), "{key} missing 'description'");
        }
    }
}
