//! Iteration loop

use super::clock::EventClock;
use super::core::TrainingRunner;
use super::result::RunResult;
use crate::hooks::HookEvent;
use crate::model::Segmentor;
use crate::optim::clip_grad_norm;
use crate::{Error, Result};
use std::time::Instant;

impl<M: Segmentor> TrainingRunner<M> {
    /// Run until the clock reaches `max_iterations`
    ///
    /// Per iteration: fetch a batch, fire `before_iteration`, forward,
    /// combine losses, backward, optional gradient clipping, optimizer step,
    /// fire `after_iteration`, advance the clock, then checkpoint if due.
    ///
    /// Any error halts the run at the iteration where it occurred; no
    /// checkpoint is written for an iteration that did not complete.
    ///
    /// # Arguments
    ///
    /// * `fetch` - Returns the batch for the iteration shown by the clock
    pub fn run<F>(&mut self, mut fetch: F) -> Result<RunResult>
    where
        F: FnMut(&EventClock) -> Result<M::Batch>,
    {
        self.start_time = Some(Instant::now());
        self.reweighter.validate_names(&self.model.loss_names())?;
        if self.model.needs_class_statistics() && self.class_stats.is_none() {
            return Err(Error::config(
                "calibration",
                "the model needs class statistics; call prepare_calibration before run",
            ));
        }

        self.fire(HookEvent::BeforeRun)?;
        tracing::info!(
            start = self.clock.iteration(),
            max_iterations = self.clock.max_iterations(),
            hooks = ?self.hooks.names(),
            "training started"
        );

        while !self.clock.is_finished() {
            self.run_iteration(&mut fetch)?;
            self.clock.advance();
            if self.checkpoint_due() {
                self.save_checkpoint()?;
            }
        }

        if self.config.checkpoint_interval.is_some() && self.last_checkpoint != Some(self.clock.iteration()) {
            self.save_checkpoint()?;
        }

        self.fire(HookEvent::AfterRun)?;

        let elapsed_secs = self.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64());
        tracing::info!(
            iteration = self.clock.iteration(),
            loss = ?self.last_combined,
            elapsed_secs,
            "training finished"
        );
        Ok(RunResult {
            final_iteration: self.clock.iteration(),
            final_epoch: self.clock.epoch(),
            final_loss: self.last_combined,
            weights: self.last_weights.clone(),
            elapsed_secs,
        })
    }

    fn run_iteration<F>(&mut self, fetch: &mut F) -> Result<()>
    where
        F: FnMut(&EventClock) -> Result<M::Batch>,
    {
        let iteration = self.clock.iteration();
        let batch = fetch(&self.clock).map_err(|e| Error::at_iteration("data_loader", iteration, e))?;

        self.fire(HookEvent::BeforeIteration)?;

        self.optimizer.zero_grad(self.model.params_mut());
        let losses = self.model.forward(&batch).map_err(|e| Error::at_iteration("segmentor", iteration, e))?;
        let combined = self.reweighter.combine(iteration, &losses)?;
        self.model
            .backward(&combined.weights)
            .map_err(|e| Error::at_iteration("segmentor", iteration, e))?;

        if let Some(max_norm) = self.config.grad_clip {
            let norm = clip_grad_norm(self.model.params_mut(), max_norm);
            if !norm.is_finite() {
                return Err(Error::runtime("grad_clip", iteration, format!("gradient norm is {norm}")));
            }
        }
        self.optimizer.step(self.model.params_mut());

        self.last_losses = losses;
        self.last_weights = combined.weights;
        self.last_combined = Some(combined.total);

        self.fire(HookEvent::AfterIteration)
    }

    fn checkpoint_due(&self) -> bool {
        match self.config.checkpoint_interval {
            Some(n) => self.clock.iteration() % n == 0,
            None => false,
        }
    }
}
