//! Iteration-driven learning rate policy
//!
//! The policy has three phases:
//! - fixed: for the first `fixed_iters` iterations lr = base * fixed_ratio
//! - cosine warmup: over the next `warmup_iters` iterations lr rises from
//!   `warmup_ratio * regular` to `regular` along a half cosine
//! - step decay: regular = base * gamma^k, where k counts milestones <= iteration
//!
//! The learning rate is a pure function of the iteration, so replicas agree
//! without communicating and a resumed run picks up the same value.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Learning rate as a function of the iteration
pub trait LRScheduler {
    /// Learning rate for `iteration` given the configured base rate
    fn lr_at(&self, iteration: usize, base_lr: f32) -> f32;
}

/// Fixed phase, cosine warmup and step decay
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepLrPolicy {
    /// Length of the constant phase
    pub fixed_iters: usize,
    /// Multiplier applied to the base rate during the constant phase
    pub fixed_ratio: f32,
    /// Length of the cosine warmup that follows the constant phase
    pub warmup_iters: usize,
    /// Starting fraction of the regular rate at the beginning of warmup
    pub warmup_ratio: f32,
    /// Iterations at which the rate is multiplied by `gamma`
    pub steps: Vec<usize>,
    /// Decay factor
    pub gamma: f32,
}

impl Default for StepLrPolicy {
    fn default() -> Self {
        Self {
            fixed_iters: 0,
            fixed_ratio: 1.0,
            warmup_iters: 0,
            warmup_ratio: 1.0,
            steps: Vec::new(),
            gamma: 0.1,
        }
    }
}

impl StepLrPolicy {
    /// Step decay only
    pub fn step(steps: Vec<usize>, gamma: f32) -> Self {
        Self { steps, gamma, ..Self::default() }
    }

    fn regular_lr(&self, iteration: usize, base_lr: f32) -> f32 {
        let decays = self.steps.iter().filter(|&&s| s <= iteration).count();
        base_lr * self.gamma.powi(decays as i32)
    }
}

/// Cosine interpolation from `start` (factor 0) to `end` (factor 1)
fn annealing_cos(start: f32, end: f32, factor: f32) -> f32 {
    let cos_out = (PI * factor).cos() + 1.0;
    end + 0.5 * (start - end) * cos_out
}

impl LRScheduler for StepLrPolicy {
    fn lr_at(&self, iteration: usize, base_lr: f32) -> f32 {
        if iteration < self.fixed_iters {
            return base_lr * self.fixed_ratio;
        }
        let regular = self.regular_lr(iteration, base_lr);
        let warm = iteration - self.fixed_iters;
        if warm < self.warmup_iters {
            let progress = warm as f32 / self.warmup_iters as f32;
            return annealing_cos(regular * self.warmup_ratio, regular, progress);
        }
        regular
    }
}
