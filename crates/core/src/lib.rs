#![deny(unsafe_code)]
//! Dynamic Fast Line Integral Convolution.
//!
//! Renders a 2D vector field as a noise texture smeared along its
//! streamlines, and animates it coherently as the field changes.
//!
//! - [`Streamline`] traces field lines with adaptive RK4 and emits points at
//!   a fixed arc-length spacing.
//! - [`Flic`] convolves an input image along those lines with a sliding
//!   window, depositing into an [`AccumImage`] until every pixel is covered.
//! - [`Dflic`] keeps the input texture in a [`ParticleArena`] that is
//!   advected by a motion field between frames.
//!
//! Everything is single-threaded and deterministic for a given seed.

pub mod config;
pub mod contrib;
pub mod dflic;
pub mod error;
pub mod flic;
pub mod grid;
pub mod image;
pub mod integrate;
pub mod particles;
pub mod prng;
pub mod sources;
pub mod streamline;
pub mod transform;
pub mod vector;

pub use config::{DflicParams, FlicParams, TracerParams};
pub use dflic::{Dflic, FrameStats};
pub use error::FlowError;
pub use flic::{Flic, FlicStats};
pub use grid::{BlockRandomGrid, RasterGrid};
pub use image::{AccumImage, ScalarImage};
pub use particles::{Particle, ParticleArena, ParticleId};
pub use prng::Xorshift64;
pub use sources::{FieldSource, Snapshot};
pub use streamline::{Streamline, Termination};
pub use transform::RigidTransform;
pub use vector::{CachedField, FnField, UnitField, VectorField};
