//! Periodic training log

use super::traits::{Hook, HookContext, HookEvent};
use crate::Result;

/// Logs losses, weights and the learning rate every `log_interval` iterations
#[derive(Clone, Debug)]
pub struct LoggerHook {
    log_interval: usize,
    logged: usize,
}

impl LoggerHook {
    /// Create a logger hook; an interval of 0 is treated as 1
    pub fn new(log_interval: usize) -> Self {
        Self { log_interval: log_interval.max(1), logged: 0 }
    }

    /// Number of iterations logged so far
    pub fn logged(&self) -> usize {
        self.logged
    }
}

impl Default for LoggerHook {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Hook for LoggerHook {
    fn name(&self) -> &str {
        "logger"
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::BeforeRun, HookEvent::AfterIteration, HookEvent::AfterRun]
    }

    fn handle(&mut self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        let iteration = ctx.iteration();
        match event {
            HookEvent::BeforeRun => {
                tracing::info!(
                    iteration,
                    max_iterations = ctx.clock.max_iterations(),
                    params = ctx.params.len(),
                    "run starting"
                );
            }
            HookEvent::AfterIteration if (iteration + 1) % self.log_interval == 0 => {
                for (name, raw) in ctx.losses {
                    let weight = ctx.weights.get(name).copied().unwrap_or(1.0);
                    tracing::debug!(iteration, loss = %name, raw, weight, "loss term");
                }
                tracing::info!(
                    iteration = iteration + 1,
                    epoch = ctx.clock.epoch(),
                    loss = ctx.combined_loss.unwrap_or(f32::NAN),
                    lr = ctx.optimizer.lr(),
                    "train"
                );
                self.logged += 1;
            }
            HookEvent::AfterRun => {
                tracing::info!(iteration, "run finished");
            }
            _ => {}
        }
        Ok(())
    }
}
