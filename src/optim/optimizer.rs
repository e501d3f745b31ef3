//! Optimizer trait

use crate::model::ParamStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persistable optimizer state: learning rate and per-parameter buffers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Learning rate at save time
    pub lr: f32,
    /// Per-parameter buffers (e.g. momentum) keyed by parameter name
    pub buffers: BTreeMap<String, Vec<f32>>,
}

/// Trait for optimization algorithms
///
/// Implementations must skip every parameter whose `requires_grad` flag is
/// off: a frozen parameter is neither updated nor decayed, and its buffers
/// are left alone.
pub trait Optimizer: Send {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut ParamStore);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut ParamStore) {
        params.zero_grad();
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Drop cached per-parameter state (momentum etc.) for the named parameters
    fn reset_state(&mut self, names: &[String]);

    /// Snapshot of the optimizer state
    fn state(&self) -> OptimizerState;

    /// Restore a snapshot taken by [`Optimizer::state`]
    ///
    /// On error the current state must be left as it was.
    fn load_state(&mut self, state: OptimizerState) -> Result<()>;

    /// Optimizer name for logging
    fn name(&self) -> &'static str {
        "Optimizer"
    }
}
