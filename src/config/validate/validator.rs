//! Configuration validation logic
//!
//! Validates run specifications before any component is built.

use super::error::ValidationError;
use crate::config::schema::RunSpec;
use crate::data::DatasetStatCollector;
use crate::loss::LossReweighter;
use crate::optim::StepLrPolicy;
use regex::Regex;

/// Validate a run specification
///
/// Checks:
/// - Counts and intervals are positive
/// - Rates and momenta are in range
/// - Regex patterns compile
/// - Reweighter and calibration settings are consistent
pub fn validate_config(spec: &RunSpec) -> Result<(), ValidationError> {
    if spec.runner.max_iters == 0 {
        return Err(ValidationError::InvalidMaxIters(spec.runner.max_iters));
    }
    for (field, value) in [
        ("runner.iters_per_epoch", spec.runner.iters_per_epoch),
        ("runner.checkpoint_interval", spec.runner.checkpoint_interval),
        ("runner.log_interval", Some(spec.runner.log_interval)),
    ] {
        if value == Some(0) {
            return Err(ValidationError::ZeroInterval { field });
        }
    }

    let optim = &spec.optimizer;
    if !(optim.lr > 0.0 && optim.lr <= 1.0) {
        return Err(ValidationError::InvalidLearningRate(optim.lr));
    }
    if !(0.0..1.0).contains(&optim.momentum) {
        return Err(ValidationError::InvalidMomentum { component: "optimizer", value: optim.momentum });
    }
    if !(optim.weight_decay >= 0.0 && optim.weight_decay.is_finite()) {
        return Err(ValidationError::InvalidWeightDecay(optim.weight_decay));
    }
    if let Some(grad_clip) = optim.grad_clip {
        if !(grad_clip > 0.0 && grad_clip.is_finite()) {
            return Err(ValidationError::InvalidGradClip(grad_clip));
        }
    }

    if let Some(policy) = &spec.lr_config {
        validate_lr_policy(policy)?;
    }

    if let Some(freeze) = &spec.params_config {
        if freeze.name_patterns.is_empty() {
            return Err(ValidationError::EmptyNamePatterns);
        }
        check_patterns("params_config.name_patterns", &freeze.name_patterns)?;
    }

    if let Some(ema) = &spec.ema {
        if !(0.0..1.0).contains(&ema.momentum) {
            return Err(ValidationError::InvalidMomentum { component: "ema", value: ema.momentum });
        }
        if ema.interval == 0 {
            return Err(ValidationError::ZeroInterval { field: "ema.interval" });
        }
    }

    LossReweighter::new(spec.reweighter.clone())
        .map_err(|e| ValidationError::InvalidReweighter(e.to_string()))?;

    if let Some(calibration) = &spec.calibration {
        if !(1..=255).contains(&calibration.num_classes) {
            return Err(ValidationError::InvalidCalibration(format!(
                "num_classes {} must be in 1..=255",
                calibration.num_classes
            )));
        }
        DatasetStatCollector::new(calibration.tau, calibration.upsilon)
            .map_err(|e| ValidationError::InvalidCalibration(e.to_string()))?;
    }

    check_patterns("ignore_keys", &spec.ignore_keys)?;

    Ok(())
}

fn validate_lr_policy(policy: &StepLrPolicy) -> Result<(), ValidationError> {
    if !(policy.fixed_ratio > 0.0 && policy.fixed_ratio.is_finite()) {
        return Err(ValidationError::InvalidLrPolicy(format!(
            "fixed_ratio {} must be > 0.0",
            policy.fixed_ratio
        )));
    }
    if !(policy.warmup_ratio > 0.0 && policy.warmup_ratio <= 1.0) {
        return Err(ValidationError::InvalidLrPolicy(format!(
            "warmup_ratio {} must be in (0.0, 1.0]",
            policy.warmup_ratio
        )));
    }
    if !(policy.gamma > 0.0 && policy.gamma <= 1.0) {
        return Err(ValidationError::InvalidLrPolicy(format!(
            "gamma {} must be in (0.0, 1.0]",
            policy.gamma
        )));
    }
    if policy.steps.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ValidationError::InvalidLrPolicy(format!(
            "steps {:?} must be strictly increasing",
            policy.steps
        )));
    }
    Ok(())
}

fn check_patterns(field: &'static str, patterns: &[String]) -> Result<(), ValidationError> {
    for pattern in patterns {
        Regex::new(pattern).map_err(|e| ValidationError::InvalidPattern {
            field,
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}
