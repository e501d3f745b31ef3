//! Stochastic Gradient Descent optimizer

use super::{Optimizer, OptimizerState};
use crate::model::ParamStore;
use crate::{Error, Result};
use ndarray::Array1;
use std::collections::BTreeMap;

/// SGD optimizer with optional momentum and L2 weight decay
///
/// Velocities are keyed by parameter name so they survive checkpointing and
/// can be dropped per parameter when a frozen group opens.
pub struct SGD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocities: BTreeMap<String, Array1<f32>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32, weight_decay: f32) -> Self {
        Self { lr, momentum, weight_decay, velocities: BTreeMap::new() }
    }

    /// Momentum coefficient
    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    /// Velocity buffer for a parameter, if one has been allocated
    pub fn velocity(&self, name: &str) -> Option<&Array1<f32>> {
        self.velocities.get(name)
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut ParamStore) {
        for (name, param) in params.iter_mut() {
            if !param.requires_grad() {
                continue;
            }
            let Some(grad) = param.grad() else { continue };

            let mut grad = grad.clone();
            if self.weight_decay > 0.0 {
                grad.scaled_add(self.weight_decay, param.data());
            }

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let velocity = match self.velocities.get(name) {
                    Some(v) if v.len() == grad.len() => v * self.momentum - &grad * self.lr,
                    _ => &grad * (-self.lr),
                };
                *param.data_mut() += &velocity;
                self.velocities.insert(name.to_string(), velocity);
            } else {
                param.data_mut().scaled_add(-self.lr, &grad);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn reset_state(&mut self, names: &[String]) {
        for name in names {
            self.velocities.remove(name);
        }
    }

    fn state(&self) -> OptimizerState {
        OptimizerState {
            lr: self.lr,
            buffers: self.velocities.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect(),
        }
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<()> {
        if !state.lr.is_finite() || state.lr < 0.0 {
            return Err(Error::state("sgd", format!("invalid learning rate {}", state.lr)));
        }
        self.lr = state.lr;
        self.velocities =
            state.buffers.into_iter().map(|(k, v)| (k, Array1::from(v))).collect();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SGD"
    }
}
