//! Core TrainingRunner struct and setup methods

use super::clock::EventClock;
use crate::checkpoint::{
    load_checkpoint, save_checkpoint, Checkpoint, LoadPolicy, LoadReport,
};
use crate::data::{AnnotationSource, ClassStatistics, DatasetStatCollector};
use crate::dist::{share_class_statistics, Communicator, SingleProcess};
use crate::hooks::{Hook, HookContext, HookEvent, HookRegistry, Priority};
use crate::loss::LossReweighter;
use crate::model::{LossMap, LossWeights, Segmentor};
use crate::optim::Optimizer;
use crate::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Checkpoint key of the loss reweighter state
pub(crate) const REWEIGHTER_KEY: &str = "loss_reweighter";

/// Runner settings
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    /// Iteration at which the run ends
    pub max_iters: usize,
    /// Epoch length, when epochs are tracked
    pub iters_per_epoch: Option<usize>,
    /// Save a checkpoint every N iterations
    pub checkpoint_interval: Option<usize>,
    /// Directory receiving `iter_<k>.json` checkpoints
    pub work_dir: PathBuf,
    /// Global gradient norm limit
    pub grad_clip: Option<f32>,
    /// Key matching policy when resuming
    pub load_policy: LoadPolicy,
}

impl RunnerConfig {
    /// Settings for a run of `max_iters` iterations without checkpoints
    pub fn new(max_iters: usize) -> Self {
        Self {
            max_iters,
            iters_per_epoch: None,
            checkpoint_interval: None,
            work_dir: PathBuf::from("work_dir"),
            grad_clip: None,
            load_policy: LoadPolicy::Strict,
        }
    }

    /// Save a checkpoint into `work_dir` every `interval` iterations
    pub fn with_checkpoints(mut self, work_dir: impl Into<PathBuf>, interval: usize) -> Self {
        self.work_dir = work_dir.into();
        self.checkpoint_interval = Some(interval).filter(|&n| n > 0);
        self
    }

    /// Clip gradients to a global norm
    pub fn with_grad_clip(mut self, max_norm: f32) -> Self {
        self.grad_clip = Some(max_norm);
        self
    }

    /// Key matching policy when resuming
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Track epochs of `iters_per_epoch` iterations
    pub fn with_iters_per_epoch(mut self, iters_per_epoch: usize) -> Self {
        self.iters_per_epoch = Some(iters_per_epoch).filter(|&n| n > 0);
        self
    }
}

/// Drives the iteration loop and is the only place hooks are fired from
///
/// # Example
///
/// ```no_run
/// use segmentar::hooks::{ParamFreezeController, Priority};
/// use segmentar::model::{SyntheticBatch, SyntheticSegmentor};
/// use segmentar::optim::SGD;
/// use segmentar::runner::{RunnerConfig, TrainingRunner};
///
/// let config = RunnerConfig::new(4000).with_checkpoints("work_dir", 1000);
/// let mut runner =
///     TrainingRunner::new(SyntheticSegmentor::default(), Box::new(SGD::new(1e-3, 0.9, 5e-4)), config);
/// runner.register_hook(ParamFreezeController::new(2000, &[r"^backbone\."])?, Priority::Normal)?;
/// runner.resume("work_dir/iter_1000.json")?;
/// let result = runner.run(|_| Ok(SyntheticBatch { target: 0.5 }))?;
/// # Ok::<(), segmentar::Error>(())
/// ```
pub struct TrainingRunner<M: Segmentor> {
    pub(crate) model: M,
    pub(crate) optimizer: Box<dyn Optimizer>,
    pub(crate) hooks: HookRegistry,
    pub(crate) reweighter: LossReweighter,
    pub(crate) clock: EventClock,
    pub(crate) config: RunnerConfig,
    pub(crate) comm: Box<dyn Communicator>,
    pub(crate) class_stats: Option<Arc<ClassStatistics>>,
    pub(crate) last_losses: LossMap,
    pub(crate) last_weights: LossWeights,
    pub(crate) last_combined: Option<f32>,
    pub(crate) last_checkpoint: Option<usize>,
    pub(crate) start_time: Option<Instant>,
}

impl<M: Segmentor> TrainingRunner<M> {
    /// Create a runner for a single-process run
    pub fn new(model: M, optimizer: Box<dyn Optimizer>, config: RunnerConfig) -> Self {
        let mut clock = EventClock::new(config.max_iters);
        if let Some(n) = config.iters_per_epoch {
            clock = clock.with_iters_per_epoch(n);
        }
        Self {
            model,
            optimizer,
            hooks: HookRegistry::new(),
            reweighter: LossReweighter::default(),
            clock,
            config,
            comm: Box::new(SingleProcess),
            class_stats: None,
            last_losses: LossMap::new(),
            last_weights: LossWeights::new(),
            last_combined: None,
            last_checkpoint: None,
            start_time: None,
        }
    }

    /// Run as one replica of a group
    pub fn with_communicator(mut self, comm: Box<dyn Communicator>) -> Self {
        self.comm = comm;
        self
    }

    /// Replace the loss reweighter
    pub fn set_reweighter(&mut self, reweighter: LossReweighter) {
        self.reweighter = reweighter;
    }

    /// Register a lifecycle hook
    pub fn register_hook<H: Hook + 'static>(&mut self, hook: H, priority: Priority) -> Result<()> {
        self.register_boxed_hook(Box::new(hook), priority)
    }

    /// Register an already boxed lifecycle hook
    pub fn register_boxed_hook(&mut self, hook: Box<dyn Hook>, priority: Priority) -> Result<()> {
        if hook.name() == REWEIGHTER_KEY {
            return Err(Error::config(
                "hook_registry",
                format!("hook name '{REWEIGHTER_KEY}' is reserved"),
            ));
        }
        self.hooks.register_boxed(hook, priority)
    }

    /// Registered hooks
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The model
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The model, mutably
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Consume the runner and return the model
    pub fn into_model(self) -> M {
        self.model
    }

    /// The optimizer
    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    /// The loss reweighter
    pub fn reweighter(&self) -> &LossReweighter {
        &self.reweighter
    }

    /// Iteration and epoch counters
    pub fn clock(&self) -> &EventClock {
        &self.clock
    }

    /// Runner settings
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Statistics handed to the model, if calibration ran
    pub fn class_statistics(&self) -> Option<&ClassStatistics> {
        self.class_stats.as_deref()
    }

    /// Path of the checkpoint written at `iteration`
    pub fn checkpoint_path(&self, iteration: usize) -> PathBuf {
        self.config.work_dir.join(format!("iter_{iteration}.json"))
    }

    /// Dispatch an event with a context borrowing the runner state
    pub(crate) fn fire(&mut self, event: HookEvent) -> Result<()> {
        let mut ctx = HookContext {
            clock: &self.clock,
            params: self.model.params_mut(),
            optimizer: &mut *self.optimizer,
            losses: &self.last_losses,
            weights: &self.last_weights,
            combined_loss: self.last_combined,
        };
        self.hooks.fire(event, &mut ctx)
    }

    /// Compute dataset statistics on rank 0 and hand them to the model
    ///
    /// Does nothing when the model has no calibration-aware loss. Ranks
    /// other than 0 never read `source`.
    pub fn prepare_calibration(
        &mut self,
        source: &dyn AnnotationSource,
        collector: &DatasetStatCollector,
    ) -> Result<Option<&ClassStatistics>> {
        if !self.model.needs_class_statistics() {
            return Ok(None);
        }
        if self.class_stats.is_some() {
            return Err(Error::config("calibration", "class statistics were already computed"));
        }
        let stats = Arc::new(share_class_statistics(self.comm.as_ref(), || collector.collect(source))?);
        self.model.set_class_statistics(Arc::clone(&stats))?;
        self.class_stats = Some(stats);
        Ok(self.class_stats.as_deref())
    }

    /// Assemble the current run state
    pub fn checkpoint(&self) -> Checkpoint {
        let mut hook_states = self.hooks.states();
        hook_states.insert(REWEIGHTER_KEY.to_string(), self.reweighter.state());
        Checkpoint::new(
            self.clock.clone(),
            self.model.params().snapshot(),
            self.optimizer.state(),
            hook_states,
        )
    }

    /// Fire `before_save_checkpoint` and write `iter_<k>.json` on rank 0
    ///
    /// Returns the path written, or `None` on other ranks.
    pub fn save_checkpoint(&mut self) -> Result<Option<PathBuf>> {
        self.fire(HookEvent::BeforeSaveCheckpoint)?;
        let iteration = self.clock.iteration();
        self.last_checkpoint = Some(iteration);
        if !self.comm.is_main() {
            return Ok(None);
        }
        let path = self.checkpoint_path(iteration);
        save_checkpoint(&self.checkpoint(), &path)?;
        tracing::info!(iteration, path = %path.display(), "checkpoint saved");
        Ok(Some(path))
    }

    /// Restore the full run state from a checkpoint
    ///
    /// Must be called before [`TrainingRunner::run`]. Hook states, the
    /// reweighter, model parameters, optimizer state and the clock are all
    /// checked under the configured load policy before any of them is
    /// applied, so a failed load leaves the runner untouched. Fires
    /// `after_load_checkpoint` once everything is restored.
    pub fn resume(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let checkpoint = load_checkpoint(path)?;
        let policy = self.config.load_policy;

        let mut hook_states = checkpoint.hook_states;
        let mut reweighter = self.reweighter.clone();
        match hook_states.remove(REWEIGHTER_KEY) {
            Some(state) => {
                reweighter.load_state(state, policy)?;
            }
            None => {
                let report = LoadReport { missing: vec![REWEIGHTER_KEY.to_string()], ..Default::default() };
                report.enforce("hook_states", policy)?;
            }
        }
        let hook_report = self.hooks.check_states(&hook_states, policy)?;
        let report = self.model.params().check_values(&checkpoint.model_parameters, policy, &[])?;

        // an optimizer leaves its state untouched when load_state fails
        self.optimizer.load_state(checkpoint.optimizer_state)?;
        self.hooks.apply_states(&hook_report, &hook_states, policy)?;
        self.model.params_mut().apply_values(&report, &checkpoint.model_parameters);
        self.reweighter = reweighter;
        self.clock.restore(&checkpoint.clock);
        self.last_checkpoint = Some(self.clock.iteration());

        tracing::info!(
            iteration = self.clock.iteration(),
            epoch = self.clock.epoch(),
            path = %path.display(),
            loaded = report.loaded.len(),
            "resumed from checkpoint"
        );
        self.fire(HookEvent::AfterLoadCheckpoint)
    }

    /// Load model weights only, e.g. from a pretrained run with different heads
    ///
    /// Parameters matching any `ignore_keys` pattern are left untouched.
    pub fn load_weights(
        &mut self,
        path: impl AsRef<Path>,
        policy: LoadPolicy,
        ignore_keys: &[Regex],
    ) -> Result<LoadReport> {
        let path = path.as_ref();
        let checkpoint = load_checkpoint(path)?;
        let report = self.model.params_mut().load_values(&checkpoint.model_parameters, policy, ignore_keys)?;
        tracing::info!(
            path = %path.display(),
            loaded = report.loaded.len(),
            ignored = report.ignored.len(),
            "weights loaded"
        );
        Ok(report)
    }
}
