//! Optimizers, gradient clipping and learning rate policies

mod clip;
mod optimizer;
mod scheduler;
mod sgd;

pub use clip::clip_grad_norm;
pub use optimizer::{Optimizer, OptimizerState};
pub use scheduler::{LRScheduler, StepLrPolicy};
pub use sgd::SGD;
