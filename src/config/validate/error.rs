//! Validation error types
//!
//! Defines all validation error variants for run specifications.

use crate::Error;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid max_iters: {0} (must be > 0)")]
    InvalidMaxIters(usize),

    #[error("Invalid {field}: 0 (must be > 0 when set)")]
    ZeroInterval { field: &'static str },

    #[error("Invalid learning rate: {0} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid momentum for {component}: {value} (must be in [0.0, 1.0))")]
    InvalidMomentum { component: &'static str, value: f32 },

    #[error("Invalid weight decay: {0} (must be >= 0.0)")]
    InvalidWeightDecay(f32),

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid lr_config: {0}")]
    InvalidLrPolicy(String),

    #[error("params_config.name_patterns cannot be empty")]
    EmptyNamePatterns,

    #[error("Invalid regex '{pattern}' in {field}: {message}")]
    InvalidPattern { field: &'static str, pattern: String, message: String },

    #[error("Invalid reweighter: {0}")]
    InvalidReweighter(String),

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::config("config", e.to_string())
    }
}
