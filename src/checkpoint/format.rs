//! Persisted run state

use crate::optim::OptimizerState;
use crate::runner::EventClock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version written into every checkpoint
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Serialization format, chosen by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
}

impl CheckpointFormat {
    /// Detect the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Internal state of one stateful component
///
/// The set of variants is closed: each component declares exactly which
/// keys it persists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookState {
    /// Parameter freeze controller: iteration at which frozen groups opened
    ParamFreeze { open_since: Option<usize> },
    /// EMA shadow values keyed by parameter name
    Ema { shadow_values: BTreeMap<String, Vec<f32>> },
    /// Loss reweighter running averages keyed by loss name
    LossReweighter { running_averages: BTreeMap<String, f32> },
}

impl HookState {
    /// Variant name as written in the checkpoint
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParamFreeze { .. } => "param_freeze",
            Self::Ema { .. } => "ema",
            Self::LossReweighter { .. } => "loss_reweighter",
        }
    }
}

/// Everything needed to resume a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version
    pub format_version: u32,
    /// Iteration and epoch counters
    pub clock: EventClock,
    /// Model parameter values keyed by name
    pub model_parameters: BTreeMap<String, Vec<f32>>,
    /// Optimizer learning rate and buffers
    pub optimizer_state: OptimizerState,
    /// Hook and aggregator states keyed by component name
    pub hook_states: BTreeMap<String, HookState>,
}

impl Checkpoint {
    /// Assemble a checkpoint at the current format version
    pub fn new(
        clock: EventClock,
        model_parameters: BTreeMap<String, Vec<f32>>,
        optimizer_state: OptimizerState,
        hook_states: BTreeMap<String, HookState>,
    ) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            clock,
            model_parameters,
            optimizer_state,
            hook_states,
        }
    }

    /// Iteration at which the checkpoint was taken
    pub fn iteration(&self) -> usize {
        self.clock.iteration()
    }
}
