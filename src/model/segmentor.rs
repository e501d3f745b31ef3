//! Model collaborator interface

use super::store::ParamStore;
use crate::data::ClassStatistics;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Raw loss values keyed by `<head>.<loss>` name (e.g. `decode_0.loss_seg`)
pub type LossMap = BTreeMap<String, f32>;

/// Per-loss weights used to form the combined scalar
pub type LossWeights = BTreeMap<String, f32>;

/// A segmentation model as seen by the training core
///
/// The numeric backend stays opaque: the runner only asks for named losses
/// and for gradients of the weighted sum of those losses.
pub trait Segmentor {
    /// Batch type consumed by [`Segmentor::forward`]
    type Batch;

    /// Named parameters
    fn params(&self) -> &ParamStore;

    /// Named parameters for mutation (gradient switches, values)
    fn params_mut(&mut self) -> &mut ParamStore;

    /// Names of every loss term [`Segmentor::forward`] produces
    fn loss_names(&self) -> Vec<String>;

    /// Forward pass returning one raw value per loss term
    fn forward(&mut self, batch: &Self::Batch) -> Result<LossMap>;

    /// Backward pass for `Σ weight_i × loss_i` of the last forward.
    ///
    /// Gradients are written only to parameters whose `requires_grad` is set.
    fn backward(&mut self, weights: &LossWeights) -> Result<()>;

    /// Whether any loss term needs margin calibration statistics
    fn needs_class_statistics(&self) -> bool {
        false
    }

    /// Hand the dataset statistics to every calibration-aware loss term
    fn set_class_statistics(&mut self, _stats: Arc<ClassStatistics>) -> Result<()> {
        Ok(())
    }
}
