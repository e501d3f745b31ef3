//! Inspect command implementation

use crate::checkpoint::{load_checkpoint, Checkpoint, HookState};
use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::InspectArgs;

pub fn run_inspect(args: InspectArgs, level: LogLevel) -> Result<(), String> {
    let checkpoint = load_checkpoint(&args.checkpoint).map_err(|e| format!("Checkpoint error: {e}"))?;
    for line in summarize(&checkpoint) {
        log(level, LogLevel::Normal, &line);
    }
    Ok(())
}

/// Human readable checkpoint summary, one line per entry
pub(super) fn summarize(checkpoint: &Checkpoint) -> Vec<String> {
    let clock = &checkpoint.clock;
    let mut lines = vec![
        format!("Format version: {}", checkpoint.format_version),
        format!(
            "Clock: iteration {} / {} (epoch {})",
            clock.iteration(),
            clock.max_iterations(),
            clock.epoch()
        ),
        format!(
            "Model parameters: {} tensors, {} values",
            checkpoint.model_parameters.len(),
            checkpoint.model_parameters.values().map(Vec::len).sum::<usize>()
        ),
        format!(
            "Optimizer: lr {}, {} buffers",
            checkpoint.optimizer_state.lr,
            checkpoint.optimizer_state.buffers.len()
        ),
        format!("Hook states: {}", checkpoint.hook_states.len()),
    ];

    for (name, state) in &checkpoint.hook_states {
        let detail = match state {
            HookState::ParamFreeze { open_since: Some(k) } => format!("open since iteration {k}"),
            HookState::ParamFreeze { open_since: None } => "frozen".to_string(),
            HookState::Ema { shadow_values } => format!("{} shadow tensors", shadow_values.len()),
            HookState::LossReweighter { running_averages } => running_averages
                .iter()
                .map(|(loss, avg)| format!("{loss}={avg:.6}"))
                .collect::<Vec<_>>()
                .join(", "),
        };
        lines.push(format!("  {name} ({}): {detail}", state.kind()));
    }
    lines
}
