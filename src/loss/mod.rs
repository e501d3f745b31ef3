//! Loss combination and calibration

mod calibration;
mod reweight;

pub use calibration::MarginCalibration;
pub use reweight::{Combined, LossReweighter, ReweightConfig};
