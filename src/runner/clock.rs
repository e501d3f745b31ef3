//! Iteration and epoch counters

use serde::{Deserialize, Serialize};

/// Monotonic iteration/epoch counter driving every scheduling decision
///
/// Only the runner advances the clock. Hooks read it through the context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventClock {
    iteration: usize,
    epoch: usize,
    max_iterations: usize,
    #[serde(default)]
    iters_per_epoch: Option<usize>,
}

impl EventClock {
    /// Clock at iteration 0 for a run of `max_iterations`
    pub fn new(max_iterations: usize) -> Self {
        Self { iteration: 0, epoch: 0, max_iterations, iters_per_epoch: None }
    }

    /// Derive the epoch from the iteration with a fixed epoch length
    pub fn with_iters_per_epoch(mut self, iters_per_epoch: usize) -> Self {
        self.iters_per_epoch = Some(iters_per_epoch).filter(|&n| n > 0);
        self
    }

    /// Number of completed iterations
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Current epoch
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Iteration at which the run ends
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Epoch length, when epochs are tracked
    pub fn iters_per_epoch(&self) -> Option<usize> {
        self.iters_per_epoch
    }

    /// Whether the run has reached `max_iterations`
    pub fn is_finished(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// Move to the next iteration
    pub(crate) fn advance(&mut self) {
        self.iteration += 1;
        if let Some(n) = self.iters_per_epoch {
            self.epoch = self.iteration / n;
        }
    }

    /// Adopt the counters of a saved clock, keeping the configured run length
    pub(crate) fn restore(&mut self, saved: &EventClock) {
        self.iteration = saved.iteration;
        self.epoch = saved.epoch;
    }
}
