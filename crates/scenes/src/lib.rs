#![deny(unsafe_code)]
//! Scene registry: named field/motion pairs ready to animate with DFLIC,
//! plus CPU-side grayscale snapshots.
//!
//! Both the CLI and tests build scenes by name through [`Scene::from_name`]
//! so dispatch lives in one place. Every scene lives in field space
//! `[-1, 1]^2`, mapped onto the image with y pointing up.

pub mod pixel;

#[cfg(feature = "png")]
pub mod snapshot;

use dflic_core::config::{param_f64, param_u32};
use dflic_core::sources::{CurlNoise, RigidRotation, RotatingDipole, UniformFlow, Vortex};
use dflic_core::{
    AccumImage, Dflic, DflicParams, FieldSource, FlowError, FrameStats, RigidTransform, Snapshot,
};
use glam::DVec2;
use log::debug;
use serde_json::{json, Value};

/// All available scene names.
const SCENE_NAMES: &[&str] = &["uniform", "vortex", "curl", "dipole"];

/// A field source frozen at the scene's current time.
pub type SceneField = Snapshot<Box<dyn FieldSource>>;

/// The kinds of scene the registry knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    /// Straight parallel flow drifting along itself.
    Uniform,
    /// A Gaussian vortex whose texture turns with it.
    Vortex,
    /// Divergence-free Perlin turbulence that evolves over time.
    Curl,
    /// Two opposite charges orbiting the centre.
    Dipole,
}

impl SceneKind {
    /// Returns `FlowError::UnknownScene` if the name is not recognized.
    pub fn from_name(name: &str) -> Result<Self, FlowError> {
        match name {
            "uniform" => Ok(SceneKind::Uniform),
            "vortex" => Ok(SceneKind::Vortex),
            "curl" => Ok(SceneKind::Curl),
            "dipole" => Ok(SceneKind::Dipole),
            _ => Err(FlowError::UnknownScene(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SceneKind::Uniform => "uniform",
            SceneKind::Vortex => "vortex",
            SceneKind::Curl => "curl",
            SceneKind::Dipole => "dipole",
        }
    }

    /// Field and motion sources, plus the scene parameters actually used.
    fn build(&self, seed: u64, params: &Value) -> (Box<dyn FieldSource>, Box<dyn FieldSource>, Value) {
        match self {
            SceneKind::Uniform => {
                let angle = param_f64(params, "angle", 0.5);
                let speed = param_f64(params, "speed", 0.2);
                let dir = DVec2::from_angle(angle);
                (
                    Box::new(UniformFlow { velocity: dir }),
                    Box::new(UniformFlow { velocity: dir * speed }),
                    json!({ "angle": angle, "speed": speed }),
                )
            }
            SceneKind::Vortex => {
                let strength = param_f64(params, "strength", 1.0);
                let radius = param_f64(params, "radius", 0.6);
                let omega = param_f64(params, "omega", 0.5);
                (
                    Box::new(Vortex {
                        center: DVec2::ZERO,
                        strength,
                        radius,
                    }),
                    Box::new(RigidRotation {
                        center: DVec2::ZERO,
                        omega,
                    }),
                    json!({ "strength": strength, "radius": radius, "omega": omega }),
                )
            }
            SceneKind::Curl => {
                let scale = param_f64(params, "scale", 2.0);
                let strength = param_f64(params, "strength", 1.0);
                let drift = param_f64(params, "drift", 0.1);
                let noise_seed = param_u32(params, "noise_seed", fold_seed(seed));
                (
                    Box::new(CurlNoise::new(scale, strength, noise_seed)),
                    Box::new(CurlNoise::new(scale, drift, noise_seed)),
                    json!({ "scale": scale, "strength": strength, "drift": drift, "noise_seed": noise_seed }),
                )
            }
            SceneKind::Dipole => {
                let separation = param_f64(params, "separation", 0.35);
                let omega = param_f64(params, "omega", 0.6);
                let charge = param_f64(params, "charge", 1.0);
                (
                    Box::new(RotatingDipole {
                        separation,
                        omega,
                        charge,
                    }),
                    Box::new(RigidRotation {
                        center: DVec2::ZERO,
                        omega,
                    }),
                    json!({ "separation": separation, "omega": omega, "charge": charge }),
                )
            }
        }
    }

    /// Scene-specific parameters with their defaults.
    fn schema(&self) -> Value {
        let number = |default: f64, description: &str| {
            json!({ "type": "number", "default": default, "description": description })
        };
        match self {
            SceneKind::Uniform => json!({
                "angle": number(0.5, "Flow direction in radians"),
                "speed": number(0.2, "Texture drift speed in field units per time"),
            }),
            SceneKind::Vortex => json!({
                "strength": number(1.0, "Peak swirl speed"),
                "radius": number(0.6, "Gaussian falloff radius"),
                "omega": number(0.5, "Texture rotation rate in radians per time"),
            }),
            SceneKind::Curl => json!({
                "scale": number(2.0, "Spatial frequency of the noise"),
                "strength": number(1.0, "Flow speed"),
                "drift": number(0.1, "Texture advection speed"),
                "noise_seed": { "type": "integer", "default": "derived from --seed", "description": "Perlin seed" },
            }),
            SceneKind::Dipole => json!({
                "separation": number(0.35, "Distance from the centre to each charge"),
                "omega": number(0.6, "Orbit rate in radians per time"),
                "charge": number(1.0, "Charge magnitude"),
            }),
        }
    }
}

/// Folds a 64-bit run seed into the 32 bits Perlin noise takes.
fn fold_seed(seed: u64) -> u32 {
    ((seed ^ (seed >> 32)) & u64::from(u32::MAX)) as u32
}

/// Maps field space `[-1, 1]^2` onto a `width x height` image: centred,
/// y up, the unit square fitting the shorter side.
pub fn field_to_image(width: usize, height: usize) -> Result<RigidTransform, FlowError> {
    let s = width.min(height) as f64 / 2.0;
    let centre = DVec2::new((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0);
    RigidTransform::from_axes(centre, DVec2::new(s, 0.0), DVec2::new(0.0, -s))
}

/// A named scene animated by DFLIC.
pub struct Scene {
    kind: SceneKind,
    dflic: Dflic<SceneField, SceneField>,
    time: f64,
    scene_params: Value,
}

impl Scene {
    /// Constructs a scene by name with lenient JSON overrides for both the
    /// scene and the DFLIC engine.
    ///
    /// Returns `FlowError::UnknownScene` for an unrecognized name,
    /// `FlowError::InvalidDimensions` for a zero-sized image, and
    /// `FlowError::InvalidParameter` for out-of-range engine settings.
    pub fn from_name(
        name: &str,
        width: usize,
        height: usize,
        seed: u64,
        params: &Value,
    ) -> Result<Self, FlowError> {
        let kind = SceneKind::from_name(name)?;
        let output = AccumImage::new(width, height)?;
        let f2o = field_to_image(width, height)?;
        let (field, motion, scene_params) = kind.build(seed, params);
        let engine = DflicParams::from_json(params, width, height);
        let dflic = Dflic::new(
            Snapshot::new(field, 0.0),
            Snapshot::new(motion, 0.0),
            output,
            f2o,
            engine,
            seed,
        )?;
        debug!("scene {name}: {width}x{height}, seed {seed}, params {scene_params}");
        Ok(Self {
            kind,
            dflic,
            time: 0.0,
            scene_params,
        })
    }

    /// Returns a slice of all recognized scene names.
    pub fn list_scenes() -> &'static [&'static str] {
        SCENE_NAMES
    }

    pub fn kind(&self) -> SceneKind {
        self.kind
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dflic(&self) -> &Dflic<SceneField, SceneField> {
        &self.dflic
    }

    pub fn output(&self) -> &AccumImage {
        self.dflic.output()
    }

    /// Renders the frame at the current time.
    pub fn render_frame(&mut self) -> Result<FrameStats, FlowError> {
        let singularities = self.dflic.field().singularities();
        self.dflic.set_singularities(singularities);
        self.dflic.compute()
    }

    /// Moves the particles through the motion field and the clock forward
    /// by `dt`.
    pub fn advance(&mut self, dt: f64) -> Result<(), FlowError> {
        self.dflic.evolve(dt)?;
        if dt > 0.0 {
            self.time += dt;
            self.dflic.field_mut().set_time(self.time);
            self.dflic.motion_mut().set_time(self.time);
        }
        Ok(())
    }

    /// Scene and engine parameters in effect.
    pub fn params(&self) -> Value {
        let mut out = self.scene_params.clone();
        let engine = serde_json::to_value(self.dflic.params()).unwrap_or_default();
        if let (Some(out), Value::Object(engine)) = (out.as_object_mut(), engine) {
            out.extend(engine);
        }
        out
    }

    /// Parameter descriptions for the scene and the engine.
    pub fn param_schema(&self) -> Value {
        let mut out = self.kind.schema();
        if let (Some(out), Value::Object(engine)) = (out.as_object_mut(), DflicParams::param_schema()) {
            out.extend(engine);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(name: &str) -> Scene {
        Scene::from_name(name, 24, 24, 42, &json!({})).unwrap()
    }

    // -- Registry --

    #[test]
    fn every_listed_scene_builds() {
        for name in Scene::list_scenes() {
            let s = scene(name);
            assert_eq!(s.kind().name(), *name);
        }
    }

    #[test]
    fn unknown_scene_returns_error() {
        let result = Scene::from_name("tornado", 16, 16, 1, &json!({}));
        assert!(matches!(result, Err(FlowError::UnknownScene(_))));
    }

    #[test]
    fn zero_size_is_rejected() {
        let result = Scene::from_name("uniform", 0, 16, 1, &json!({}));
        assert!(matches!(result, Err(FlowError::InvalidDimensions)));
    }

    #[test]
    fn curl_noise_seed_comes_from_run_seed_or_params() {
        let folded = Scene::from_name("curl", 16, 16, 0x0000_0003_0000_0005, &json!({})).unwrap();
        assert_eq!(folded.params()["noise_seed"], json!(6));
        let explicit = Scene::from_name("curl", 16, 16, 1, &json!({ "noise_seed": 99 })).unwrap();
        assert_eq!(explicit.params()["noise_seed"], json!(99));
        let big: u64 = 1 << 40;
        let too_big = Scene::from_name("curl", 16, 16, 1, &json!({ "noise_seed": big })).unwrap();
        assert_eq!(too_big.params()["noise_seed"], json!(fold_seed(1)));
    }

    #[test]
    fn bad_engine_params_are_rejected() {
        let result = Scene::from_name("uniform", 16, 16, 1, &json!({ "step_size": -1.0 }));
        assert!(matches!(result, Err(FlowError::InvalidParameter { .. })));
    }

    #[test]
    fn params_merge_scene_and_engine() {
        let s = Scene::from_name("vortex", 16, 16, 1, &json!({ "radius": 0.3, "stream_len": 6.0 })).unwrap();
        let p = s.params();
        assert_eq!(p["radius"], json!(0.3));
        assert_eq!(p["flic"]["stream_len"], json!(6.0));
        assert!(p.get("undercovered_weight").is_some());
    }

    #[test]
    fn schema_lists_scene_and_engine_keys() {
        let schema = scene("dipole").param_schema();
        assert!(schema.get("separation").is_some());
        assert!(schema.get("stream_len").is_some());
        assert!(schema.get("jitter").is_some());
    }

    // -- Transform --

    #[test]
    fn field_origin_maps_to_image_centre_with_y_up() {
        let t = field_to_image(33, 21).unwrap();
        let c = t.forward(DVec2::ZERO);
        assert!((c - DVec2::new(16.0, 10.0)).length() < 1e-12);
        let up = t.forward(DVec2::Y);
        assert!(up.y < c.y);
        assert!((t.scale() - 10.5).abs() < 1e-12);
    }

    // -- Frames --

    #[test]
    fn each_scene_renders_a_normalized_frame() {
        for name in Scene::list_scenes() {
            let mut s = scene(name);
            let stats = s.render_frame().unwrap();
            assert_eq!(stats.flic.uncoverable, 0, "{name}: uncovered pixels");
            assert!(s.output().values().data().iter().all(|v| v.is_finite()), "{name}");
            assert!(s.output().weights().iter().all(|&a| a == 1.0), "{name}");
        }
    }

    #[test]
    fn advance_moves_the_clock() {
        let mut s = scene("curl");
        s.render_frame().unwrap();
        s.advance(0.25).unwrap();
        s.advance(0.0).unwrap();
        assert!((s.time() - 0.25).abs() < 1e-12);
        assert!((s.dflic().field().time() - 0.25).abs() < 1e-12);
        assert!((s.dflic().motion().time() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn dipole_singularities_follow_the_charges() {
        let mut s = Scene::from_name("dipole", 16, 16, 1, &json!({ "omega": 1.0 })).unwrap();
        s.advance(std::f64::consts::FRAC_PI_2).unwrap();
        let sing = s.dflic().field().singularities();
        assert_eq!(sing.len(), 2);
        assert!((sing[0] - DVec2::new(0.0, 0.35)).length() < 1e-9);
    }

    #[test]
    fn same_seed_same_frames() {
        let mut a = scene("vortex");
        let mut b = scene("vortex");
        for _ in 0..2 {
            a.render_frame().unwrap();
            b.render_frame().unwrap();
            a.advance(0.1).unwrap();
            b.advance(0.1).unwrap();
        }
        assert_eq!(a.output().values(), b.output().values());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn unit_square_fits_the_image(w in 1_usize..512, h in 1_usize..512) {
                let t = field_to_image(w, h).unwrap();
                for corner in [DVec2::new(-1.0, -1.0), DVec2::new(1.0, 1.0)] {
                    let p = t.forward(corner);
                    prop_assert!(p.x >= -0.5 - 1e-9 && p.x <= w as f64 - 0.5 + 1e-9);
                    prop_assert!(p.y >= -0.5 - 1e-9 && p.y <= h as f64 - 0.5 + 1e-9);
                }
            }
        }
    }
}
