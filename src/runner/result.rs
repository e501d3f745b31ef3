//! Run result types

use crate::model::LossWeights;

/// Result of a training run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Iteration reached (equals `max_iterations` for a completed run)
    pub final_iteration: usize,
    /// Epoch reached
    pub final_epoch: usize,
    /// Combined loss of the last iteration, if any iteration ran
    pub final_loss: Option<f32>,
    /// Loss weights of the last iteration
    pub weights: LossWeights,
    /// Total run time in seconds
    pub elapsed_secs: f64,
}
