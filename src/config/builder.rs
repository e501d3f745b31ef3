//! Build run components from configuration

use super::schema::{OptimSpec, RunSpec};
use crate::data::DatasetStatCollector;
use crate::error::{Error, Result};
use crate::hooks::{EmaHook, LoggerHook, ParamFreezeController, Priority, StepLrHook};
use crate::loss::LossReweighter;
use crate::model::Segmentor;
use crate::optim::{Optimizer, SGD};
use crate::runner::{RunnerConfig, TrainingRunner};
use regex::Regex;

/// Build the optimizer from configuration
pub fn build_optimizer(spec: &OptimSpec) -> Box<dyn Optimizer> {
    Box::new(SGD::new(spec.lr, spec.momentum, spec.weight_decay))
}

/// Runner settings from configuration
pub fn build_runner_config(spec: &RunSpec) -> RunnerConfig {
    let mut config = RunnerConfig::new(spec.runner.max_iters).with_load_policy(spec.load_policy);
    if let Some(interval) = spec.runner.checkpoint_interval {
        config = config.with_checkpoints(spec.runner.work_dir.clone(), interval);
    } else {
        config.work_dir = spec.runner.work_dir.clone();
    }
    if let Some(n) = spec.runner.iters_per_epoch {
        config = config.with_iters_per_epoch(n);
    }
    if let Some(max_norm) = spec.optimizer.grad_clip {
        config = config.with_grad_clip(max_norm);
    }
    config
}

/// Statistics collector from the calibration section, if any
pub fn build_stat_collector(spec: &RunSpec) -> Result<Option<DatasetStatCollector>> {
    spec.calibration
        .as_ref()
        .map(|c| DatasetStatCollector::new(c.tau, c.upsilon))
        .transpose()
}

/// Compile `ignore_keys` patterns
pub fn compile_ignore_keys(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::config("ignore_keys", format!("invalid regex '{p}': {e}"))))
        .collect()
}

/// Build a runner with every configured hook registered
///
/// Priorities: lr policy VERY_HIGH, parameter freeze ABOVE_NORMAL, EMA
/// NORMAL, logger VERY_LOW.
pub fn build_runner<M: Segmentor>(spec: &RunSpec, model: M) -> Result<TrainingRunner<M>> {
    let mut runner = TrainingRunner::new(model, build_optimizer(&spec.optimizer), build_runner_config(spec));
    runner.set_reweighter(LossReweighter::new(spec.reweighter.clone())?);

    if let Some(policy) = &spec.lr_config {
        runner.register_hook(StepLrHook::new(policy.clone(), spec.optimizer.lr)?, Priority::VeryHigh)?;
    }
    if let Some(freeze) = &spec.params_config {
        let controller = ParamFreezeController::new(freeze.open_after_iterations, freeze.name_patterns.as_slice())?
            .with_role(freeze.pattern_role);
        runner.register_hook(controller, Priority::AboveNormal)?;
    }
    if let Some(ema) = &spec.ema {
        let hook = EmaHook::new(ema.momentum, ema.warmup_iterations)?.with_interval(ema.interval)?;
        runner.register_hook(hook, Priority::Normal)?;
    }
    runner.register_hook(LoggerHook::new(spec.runner.log_interval), Priority::VeryLow)?;

    tracing::debug!(hooks = ?runner.hooks().names(), "runner built");
    Ok(runner)
}

/// Apply `resume_from` or `load_from`
///
/// `resume_from` restores the whole run state and takes precedence;
/// `load_from` only initializes model weights.
pub fn restore_from_spec<M: Segmentor>(runner: &mut TrainingRunner<M>, spec: &RunSpec) -> Result<()> {
    if let Some(path) = &spec.resume_from {
        if spec.load_from.is_some() {
            tracing::warn!(path = %path.display(), "both resume_from and load_from set; resuming");
        }
        return runner.resume(path);
    }
    if let Some(path) = &spec.load_from {
        let ignore = compile_ignore_keys(&spec.ignore_keys)?;
        let report = runner.load_weights(path, spec.load_policy, &ignore)?;
        tracing::info!(summary = %report.summary(), "initialized from {}", path.display());
    }
    Ok(())
}
