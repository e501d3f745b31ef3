//! Learning rate policy hook

use super::traits::{Hook, HookContext, HookEvent};
use crate::optim::{LRScheduler, StepLrPolicy};
use crate::{Error, Result};

/// Hook that sets the optimizer learning rate from a scheduler before every iteration
///
/// The base rate is fixed at construction, so a resumed run recomputes the
/// same learning rate from the restored iteration.
///
/// # Example
///
/// ```
/// use segmentar::hooks::StepLrHook;
/// use segmentar::optim::StepLrPolicy;
///
/// let hook = StepLrHook::new(StepLrPolicy::step(vec![100_000, 130_000], 0.1), 1e-3)?;
/// assert_eq!(hook.lr_at(0), 1e-3);
/// # Ok::<(), segmentar::Error>(())
/// ```
#[derive(Debug)]
pub struct LrSchedulerHook<S: LRScheduler + Send> {
    scheduler: S,
    base_lr: f32,
}

/// Learning rate hook with fixed phase, cosine warmup and step decay
pub type StepLrHook = LrSchedulerHook<StepLrPolicy>;

impl<S: LRScheduler + Send> LrSchedulerHook<S> {
    /// Create the hook; the base rate must be positive and finite
    pub fn new(scheduler: S, base_lr: f32) -> Result<Self> {
        if !(base_lr.is_finite() && base_lr > 0.0) {
            return Err(Error::config("lr_scheduler", format!("base lr must be positive, got {base_lr}")));
        }
        Ok(Self { scheduler, base_lr })
    }

    /// Learning rate the hook applies at `iteration`
    pub fn lr_at(&self, iteration: usize) -> f32 {
        self.scheduler.lr_at(iteration, self.base_lr)
    }
}

impl<S: LRScheduler + Send> Hook for LrSchedulerHook<S> {
    fn name(&self) -> &str {
        "lr_scheduler"
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::BeforeRun, HookEvent::BeforeIteration]
    }

    fn handle(&mut self, _event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        let lr = self.lr_at(ctx.iteration());
        if !lr.is_finite() {
            return Err(Error::runtime("lr_scheduler", ctx.iteration(), format!("learning rate {lr}")));
        }
        ctx.optimizer.set_lr(lr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::testing::Fixture;
    use crate::optim::Optimizer;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_non_positive_base() {
        assert!(StepLrHook::new(StepLrPolicy::default(), 0.0).unwrap_err().is_config());
        assert!(StepLrHook::new(StepLrPolicy::default(), f32::NAN).is_err());
    }

    #[test]
    fn test_sets_optimizer_lr_per_iteration() {
        let mut hook = StepLrHook::new(StepLrPolicy::step(vec![5], 0.1), 0.2).unwrap();
        let mut fx = Fixture::default();

        hook.handle(HookEvent::BeforeRun, &mut fx.ctx()).unwrap();
        assert_relative_eq!(fx.optimizer.lr(), 0.2);

        fx.at(5);
        hook.handle(HookEvent::BeforeIteration, &mut fx.ctx()).unwrap();
        assert_relative_eq!(fx.optimizer.lr(), 0.02, max_relative = 1e-5);
    }

    #[test]
    fn test_resume_recomputes_from_iteration() {
        let policy = StepLrPolicy { fixed_iters: 10, fixed_ratio: 10.0, ..StepLrPolicy::default() };
        let mut hook = StepLrHook::new(policy, 0.01).unwrap();
        let mut fx = Fixture::default();
        fx.optimizer.set_lr(123.0);
        fx.at(20);
        hook.handle(HookEvent::BeforeRun, &mut fx.ctx()).unwrap();
        assert_relative_eq!(fx.optimizer.lr(), 0.01);
    }
}
