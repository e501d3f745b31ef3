//! YAML schema definitions for declarative run configuration

use crate::checkpoint::LoadPolicy;
use crate::hooks::PatternRole;
use crate::loss::ReweightConfig;
use crate::optim::StepLrPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete run specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Loop length, checkpoint cadence and logging
    pub runner: RunnerSpec,

    /// SGD settings
    #[serde(default)]
    pub optimizer: OptimSpec,

    /// Learning rate policy; constant lr when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_config: Option<StepLrPolicy>,

    /// Parameter freeze controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params_config: Option<FreezeSpec>,

    /// EMA maintainer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema: Option<EmaSpec>,

    /// Loss combination
    #[serde(default)]
    pub reweighter: ReweightConfig,

    /// Margin calibration statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationSpec>,

    /// Full state checkpoint to resume from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<PathBuf>,

    /// Checkpoint whose model weights initialize the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_from: Option<PathBuf>,

    /// Key matching policy for `resume_from` and `load_from`
    #[serde(default)]
    pub load_policy: LoadPolicy,

    /// Regex patterns of parameters skipped by `load_from`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_keys: Vec<String>,
}

/// Runner section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerSpec {
    /// Total iterations
    pub max_iters: usize,

    /// Epoch length, when epochs are tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iters_per_epoch: Option<usize>,

    /// Checkpoint every N iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<usize>,

    /// Checkpoint directory
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Log every N iterations
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work_dir")
}

fn default_log_interval() -> usize {
    50
}

/// Optimizer section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimSpec {
    /// Base learning rate
    pub lr: f32,
    /// Momentum factor
    pub momentum: f32,
    /// L2 weight decay
    pub weight_decay: f32,
    /// Global gradient norm limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grad_clip: Option<f32>,
}

impl Default for OptimSpec {
    fn default() -> Self {
        Self { lr: 1e-3, momentum: 0.9, weight_decay: 5e-4, grad_clip: None }
    }
}

/// Parameter freeze section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreezeSpec {
    /// Iteration at which frozen groups open
    pub open_after_iterations: usize,

    /// Regex patterns selecting parameter groups
    pub name_patterns: Vec<String>,

    /// Whether matched groups are the late-opening or the early-training side
    #[serde(default)]
    pub pattern_role: PatternRole,
}

/// EMA section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmaSpec {
    /// Blend factor of the old shadow value
    pub momentum: f32,
    /// Iterations during which the shadow copies the parameters
    pub warmup_iterations: usize,
    /// Update every N iterations
    pub interval: usize,
}

impl Default for EmaSpec {
    fn default() -> Self {
        Self { momentum: 0.999, warmup_iterations: 0, interval: 1 }
    }
}

/// Margin calibration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSpec {
    /// Number of segmentation classes
    pub num_classes: usize,

    /// Negative margin scale
    #[serde(default = "default_tau")]
    pub tau: f64,

    /// Positive margin denominator scale
    #[serde(default = "default_upsilon")]
    pub upsilon: f64,
}

fn default_tau() -> f64 {
    10.0
}

fn default_upsilon() -> f64 {
    1.0
}
