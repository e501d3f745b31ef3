//! Multi-head loss combination with momentum-smoothed reweighting

use crate::checkpoint::{HookState, LoadPolicy, LoadReport};
use crate::model::{LossMap, LossWeights};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const NAME: &str = "loss_reweighter";

/// Running averages at or below this magnitude carry no scale
const AVG_EPS: f32 = 1e-8;

/// Loss reweighting configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReweightConfig {
    /// Derive weights from running averages instead of using them verbatim
    pub enabled: bool,
    /// Running-average momentum in `[0, 1)`
    pub momentum: f32,
    /// Prior weight per loss name
    pub initial_weights: BTreeMap<String, f32>,
    /// Sum of the dynamic weights
    pub total: f32,
}

impl Default for ReweightConfig {
    fn default() -> Self {
        Self { enabled: false, momentum: 0.9, initial_weights: BTreeMap::new(), total: 1.0 }
    }
}

/// Combined scalar and the weights that produced it
#[derive(Clone, Debug, PartialEq)]
pub struct Combined {
    /// `Σ weight_i × raw_i`
    pub total: f32,
    /// Weight per loss name
    pub weights: LossWeights,
}

/// Combines named head losses into one optimization target
///
/// With reweighting enabled each loss keeps a running average
/// (`avg = momentum * avg + (1 - momentum) * raw`, seeded with the first raw
/// value) and gets weight `initial_i / |avg_i|`, rescaled so the weights sum
/// to `total`. A head whose average is zero is scaled by the mean magnitude
/// of the other heads instead. Heads with large natural magnitudes are damped
/// and small ones boosted, so contributions stay comparable.
///
/// With reweighting disabled the initial weights are used verbatim and a
/// loss without an entry gets weight 1.0.
///
/// # Example
///
/// ```
/// use segmentar::loss::{LossReweighter, ReweightConfig};
/// use segmentar::model::LossMap;
///
/// let mut config = ReweightConfig { enabled: true, momentum: 0.0, ..Default::default() };
/// config.initial_weights.insert("decode_0.loss_seg".into(), 0.5);
/// config.initial_weights.insert("decode_1.loss_seg".into(), 0.5);
/// let mut reweighter = LossReweighter::new(config)?;
///
/// let mut losses = LossMap::new();
/// losses.insert("decode_0.loss_seg".into(), 4.0);
/// losses.insert("decode_1.loss_seg".into(), 1.0);
/// let combined = reweighter.combine(0, &losses)?;
/// assert!((combined.weights["decode_0.loss_seg"] - 0.2).abs() < 1e-6);
/// assert!((combined.weights["decode_1.loss_seg"] - 0.8).abs() < 1e-6);
/// # Ok::<(), segmentar::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct LossReweighter {
    config: ReweightConfig,
    running: BTreeMap<String, f32>,
}

impl Default for LossReweighter {
    fn default() -> Self {
        Self { config: ReweightConfig::default(), running: BTreeMap::new() }
    }
}

impl LossReweighter {
    /// Create a reweighter; numeric settings are validated here
    pub fn new(config: ReweightConfig) -> Result<Self> {
        if !(0.0..1.0).contains(&config.momentum) {
            return Err(Error::config(
                NAME,
                format!("momentum must lie in [0, 1), got {}", config.momentum),
            ));
        }
        if !(config.total.is_finite() && config.total > 0.0) {
            return Err(Error::config(NAME, format!("total must be positive, got {}", config.total)));
        }
        if let Some((name, w)) =
            config.initial_weights.iter().find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(Error::config(NAME, format!("weight of '{name}' must be non-negative, got {w}")));
        }
        if config.enabled && config.initial_weights.is_empty() {
            return Err(Error::config(NAME, "reweighting enabled without initial_weights"));
        }
        Ok(Self { config, running: BTreeMap::new() })
    }

    /// Configuration
    pub fn config(&self) -> &ReweightConfig {
        &self.config
    }

    /// Whether weights are derived from running averages
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Running average per loss name
    pub fn running_averages(&self) -> &BTreeMap<String, f32> {
        &self.running
    }

    /// Check the configured names against the losses the model produces
    ///
    /// Every configured name must be produced by the model. With
    /// reweighting enabled every produced loss must also be configured.
    pub fn validate_names(&self, loss_names: &[String]) -> Result<()> {
        for name in self.config.initial_weights.keys() {
            if !loss_names.contains(name) {
                return Err(Error::config(
                    NAME,
                    format!("unknown loss '{name}'; model produces {}", loss_names.join(", ")),
                ));
            }
        }
        if self.config.enabled {
            if let Some(name) = loss_names.iter().find(|n| !self.config.initial_weights.contains_key(*n)) {
                return Err(Error::config(NAME, format!("loss '{name}' missing from initial_weights")));
            }
        }
        Ok(())
    }

    /// Combine raw losses into the scalar that drives the backward pass
    pub fn combine(&mut self, iteration: usize, losses: &LossMap) -> Result<Combined> {
        if let Some((name, raw)) = losses.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::runtime(NAME, iteration, format!("loss '{name}' is {raw}")));
        }

        let weights = if self.config.enabled {
            if let Some(name) = self.config.initial_weights.keys().find(|n| !losses.contains_key(*n)) {
                return Err(Error::runtime(NAME, iteration, format!("loss '{name}' was not produced")));
            }
            self.update_running(losses);
            self.dynamic_weights(losses)
        } else {
            losses
                .keys()
                .map(|name| {
                    let w = self.config.initial_weights.get(name).copied().unwrap_or(1.0);
                    (name.clone(), w)
                })
                .collect()
        };

        let total: f32 = losses.iter().map(|(name, raw)| weights.get(name).copied().unwrap_or(0.0) * raw).sum();
        if !total.is_finite() {
            return Err(Error::runtime(NAME, iteration, format!("combined loss is {total}")));
        }
        Ok(Combined { total, weights })
    }

    fn update_running(&mut self, losses: &LossMap) {
        let m = self.config.momentum;
        for (name, &raw) in losses {
            if !self.config.initial_weights.contains_key(name) {
                continue;
            }
            self.running
                .entry(name.clone())
                .and_modify(|avg| *avg = m * *avg + (1.0 - m) * raw)
                .or_insert(raw);
        }
    }

    fn dynamic_weights(&self, losses: &LossMap) -> LossWeights {
        let init = |name: &str| self.config.initial_weights.get(name).copied().unwrap_or(0.0);
        let magnitude = |name: &str| self.running.get(name).copied().unwrap_or(0.0).abs();

        // A head averaging zero carries no scale; it borrows the mean scale of the others
        let informative: Vec<f32> =
            losses.keys().map(|name| magnitude(name.as_str())).filter(|avg| *avg > AVG_EPS).collect();
        let reference = if informative.is_empty() {
            1.0
        } else {
            informative.iter().sum::<f32>() / informative.len() as f32
        };

        let mut raw: LossWeights = losses
            .keys()
            .map(|name| {
                let avg = magnitude(name.as_str());
                let scale = if avg > AVG_EPS { avg } else { reference };
                (name.clone(), init(name.as_str()) / scale)
            })
            .collect();

        let mut sum: f32 = raw.values().sum();
        if !(sum.is_finite() && sum > 0.0) {
            for (name, w) in raw.iter_mut() {
                *w = init(name.as_str());
            }
            sum = raw.values().sum();
        }
        if !(sum.is_finite() && sum > 0.0) {
            let n = raw.len().max(1) as f32;
            for w in raw.values_mut() {
                *w = 1.0;
            }
            sum = n;
        }

        let scale = self.config.total / sum;
        for w in raw.values_mut() {
            *w *= scale;
        }
        raw
    }

    /// Persistable running averages
    pub fn state(&self) -> HookState {
        HookState::LossReweighter { running_averages: self.running.clone() }
    }

    /// Restore running averages
    ///
    /// Any finite average `combine` can produce is accepted, zero included;
    /// a non-finite one is a configuration error. Under
    /// [`LoadPolicy::Strict`] the saved names must match the configured ones
    /// when reweighting is enabled.
    pub fn load_state(&mut self, state: HookState, policy: LoadPolicy) -> Result<LoadReport> {
        let HookState::LossReweighter { running_averages } = state else {
            return Err(Error::state(
                NAME,
                format!("expected loss_reweighter state, found '{}'", state.kind()),
            ));
        };
        if let Some((name, avg)) =
            running_averages.iter().find(|(_, v)| !v.is_finite())
        {
            return Err(Error::config(NAME, format!("running average of '{name}' is {avg}")));
        }

        let mut report = LoadReport::default();
        for name in running_averages.keys() {
            if self.config.initial_weights.contains_key(name) {
                report.loaded.push(name.clone());
            } else {
                report.unexpected.push(name.clone());
            }
        }
        if self.config.enabled && !running_averages.is_empty() {
            report.missing = self
                .config
                .initial_weights
                .keys()
                .filter(|k| !running_averages.contains_key(*k))
                .cloned()
                .collect();
        }
        report.enforce(NAME, policy)?;

        self.running = running_averages
            .into_iter()
            .filter(|(name, _)| report.loaded.contains(name))
            .collect();
        Ok(report)
    }
}
