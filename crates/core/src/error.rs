//! Error types for the DFLIC core.
//!
//! Only configuration problems and resource exhaustion are errors. Streamline
//! terminations and out-of-domain samples are ordinary outcomes and are
//! reported through values (`Termination`, `Option`), not through this type.

use thiserror::Error;

/// Errors produced by image, transform, FLIC and DFLIC operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Width or height was zero when creating an image or grid.
    #[error("invalid dimensions: width and height must be non-zero")]
    InvalidDimensions,

    /// A pixel buffer's length did not match `width * height`.
    #[error("buffer length mismatch: expected {expected} samples, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A transform was not a uniformly scaled rotation/reflection.
    #[error("transform is not a uniformly scaled rigid transform")]
    NotRigidScaled,

    /// A transform had a zero or non-finite scale and cannot be inverted.
    #[error("transform is singular (zero or non-finite scale)")]
    SingularTransform,

    /// A configuration value was outside its valid range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The particle arena had no free slot for a new particle.
    #[error("particle arena exhausted (capacity {capacity})")]
    ArenaExhausted { capacity: usize },

    /// A scene name was not recognized.
    #[error("unknown scene: {0}")]
    UnknownScene(String),

    /// Writing a snapshot failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl FlowError {
    /// Shorthand for [`FlowError::InvalidParameter`].
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidParameter {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}
