//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, ValidateArgs};

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Validating config: {}", args.config.display()));

    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    log(level, LogLevel::Normal, "✓ Configuration is valid");
    log(level, LogLevel::Normal, "");
    log(level, LogLevel::Normal, "Summary:");
    log(level, LogLevel::Normal, &format!("  Max iterations: {}", spec.runner.max_iters));
    log(
        level,
        LogLevel::Normal,
        &format!(
            "  Optimizer: SGD (lr={}, momentum={}, weight_decay={})",
            spec.optimizer.lr, spec.optimizer.momentum, spec.optimizer.weight_decay
        ),
    );
    if let Some(clip) = spec.optimizer.grad_clip {
        log(level, LogLevel::Normal, &format!("  Gradient clip: {clip}"));
    }
    match spec.runner.checkpoint_interval {
        Some(n) => log(
            level,
            LogLevel::Normal,
            &format!("  Checkpoints: every {n} iterations in {}", spec.runner.work_dir.display()),
        ),
        None => log(level, LogLevel::Normal, "  Checkpoints: disabled"),
    }
    if let Some(policy) = &spec.lr_config {
        log(
            level,
            LogLevel::Normal,
            &format!(
                "  LR policy: fixed {} iters x{}, warmup {} iters, steps {:?} (gamma {})",
                policy.fixed_iters, policy.fixed_ratio, policy.warmup_iters, policy.steps, policy.gamma
            ),
        );
    }
    if let Some(freeze) = &spec.params_config {
        log(
            level,
            LogLevel::Normal,
            &format!(
                "  Freeze: {:?} open after {} iterations ({:?})",
                freeze.name_patterns, freeze.open_after_iterations, freeze.pattern_role
            ),
        );
    }
    if let Some(ema) = &spec.ema {
        log(
            level,
            LogLevel::Normal,
            &format!("  EMA: momentum {} (warmup {}, every {})", ema.momentum, ema.warmup_iterations, ema.interval),
        );
    }
    if spec.reweighter.enabled {
        log(
            level,
            LogLevel::Normal,
            &format!("  Loss reweighting: {:?}", spec.reweighter.initial_weights),
        );
    }
    if let Some(calibration) = &spec.calibration {
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  Calibration: {} classes (tau {}, upsilon {})",
                calibration.num_classes, calibration.tau, calibration.upsilon
            ),
        );
    }

    Ok(())
}
