//! Deterministic reference segmentor
//!
//! Each decode head's loss is a scaled mean squared distance between the
//! parameters it depends on (the shared backbone and neck plus its own head)
//! and the batch target. Gradients are analytic, so runs are reproducible
//! bit for bit. Used by the test-suite and by `segmentar train`.

use super::param::Param;
use super::segmentor::{LossMap, LossWeights, Segmentor};
use super::store::ParamStore;
use crate::data::ClassStatistics;
use crate::loss::MarginCalibration;
use crate::{Error, Result};
use ndarray::Array1;
use std::sync::Arc;

/// A batch for the synthetic segmentor
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SyntheticBatch {
    /// Value every parameter is pulled towards
    pub target: f32,
}

/// One decode head of the synthetic segmentor
#[derive(Clone, Debug)]
pub struct SyntheticHead {
    /// Loss name produced by this head
    pub loss_name: String,
    /// Parameter owned by this head
    pub param_name: String,
    /// Natural magnitude of the head's loss
    pub scale: f32,
}

/// Synthetic backbone + neck + multi-head segmentor
pub struct SyntheticSegmentor {
    params: ParamStore,
    shared: Vec<String>,
    heads: Vec<SyntheticHead>,
    calibration: Option<MarginCalibration>,
    last_target: Option<f32>,
}

impl SyntheticSegmentor {
    /// Parameter width used by every synthetic parameter
    pub const WIDTH: usize = 4;

    /// Create a segmentor with the given shared parameter names and heads
    ///
    /// A name listed twice refers to a single parameter.
    pub fn new(shared: &[&str], heads: Vec<SyntheticHead>) -> Self {
        let mut params = ParamStore::new();
        let mut offset = 0.0f32;
        for name in shared.iter().copied().chain(heads.iter().map(|h| h.param_name.as_str())) {
            params.get_or_insert_with(name, || {
                let values = (0..Self::WIDTH).map(|j| 1.0 + offset + 0.25 * j as f32).collect();
                offset += 0.5;
                Param::from_vec(values)
            });
        }
        Self {
            params,
            shared: shared.iter().map(|s| (*s).to_string()).collect(),
            heads,
            calibration: None,
            last_target: None,
        }
    }

    /// Require margin calibration statistics for `num_classes` classes
    pub fn with_calibration(mut self, num_classes: usize) -> Self {
        self.calibration = Some(MarginCalibration::new(num_classes));
        self
    }

    /// Statistics received from the runner, if any
    pub fn class_statistics(&self) -> Option<&ClassStatistics> {
        self.calibration.as_ref().and_then(|c| c.ensure_ready().ok())
    }

    /// Heads in declaration order
    pub fn heads(&self) -> &[SyntheticHead] {
        &self.heads
    }

    fn head_params<'a>(&'a self, head: &'a SyntheticHead) -> impl Iterator<Item = &'a str> {
        self.shared.iter().map(String::as_str).chain(std::iter::once(head.param_name.as_str()))
    }

    fn head_len(&self, head: &SyntheticHead) -> usize {
        self.head_params(head).filter_map(|n| self.params.get(n)).map(Param::len).sum()
    }
}

impl Default for SyntheticSegmentor {
    /// Backbone with an aggregator, a neck, and two decode heads whose
    /// natural loss magnitudes differ by 4x
    fn default() -> Self {
        let heads = vec![
            SyntheticHead {
                loss_name: "decode_0.loss_seg".to_string(),
                param_name: "decode_head.0.conv_seg.weight".to_string(),
                scale: 4.0,
            },
            SyntheticHead {
                loss_name: "decode_1.loss_seg".to_string(),
                param_name: "decode_head.1.conv_seg.weight".to_string(),
                scale: 1.0,
            },
        ];
        Self::new(&["backbone.stem.weight", "backbone.aggregator.weight", "neck.fuse.weight"], heads)
    }
}

impl Segmentor for SyntheticSegmentor {
    type Batch = SyntheticBatch;

    fn params(&self) -> &ParamStore {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn loss_names(&self) -> Vec<String> {
        self.heads.iter().map(|h| h.loss_name.clone()).collect()
    }

    fn forward(&mut self, batch: &SyntheticBatch) -> Result<LossMap> {
        if let Some(calibration) = &self.calibration {
            calibration.ensure_ready()?;
        }

        let mut losses = LossMap::new();
        for head in &self.heads {
            let n = self.head_len(head).max(1) as f32;
            let sq: f32 = self
                .head_params(head)
                .filter_map(|name| self.params.get(name))
                .map(|p| p.data().iter().map(|&x| (x - batch.target).powi(2)).sum::<f32>())
                .sum();
            losses.insert(head.loss_name.clone(), head.scale * sq / n);
        }
        self.last_target = Some(batch.target);
        Ok(losses)
    }

    fn backward(&mut self, weights: &LossWeights) -> Result<()> {
        let target = self
            .last_target
            .ok_or_else(|| Error::state("synthetic_segmentor", "backward called before forward"))?;

        let heads = self.heads.clone();
        for head in &heads {
            let weight = weights.get(&head.loss_name).copied().unwrap_or(0.0);
            if weight == 0.0 {
                continue;
            }
            let n = self.head_len(head).max(1) as f32;
            let coef = weight * head.scale * 2.0 / n;
            let names: Vec<String> = self.head_params(head).map(str::to_string).collect();
            for name in names {
                if let Some(param) = self.params.get_mut(&name) {
                    if !param.requires_grad() {
                        continue;
                    }
                    let grad: Array1<f32> = param.data().mapv(|x| coef * (x - target));
                    param.accumulate_grad(&grad);
                }
            }
        }
        Ok(())
    }

    fn needs_class_statistics(&self) -> bool {
        self.calibration.is_some()
    }

    fn set_class_statistics(&mut self, stats: Arc<ClassStatistics>) -> Result<()> {
        match self.calibration.as_mut() {
            Some(calibration) => calibration.set_margins(stats),
            None => Ok(()),
        }
    }
}
