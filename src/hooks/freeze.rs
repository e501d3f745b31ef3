//! Parameter freezing until an iteration threshold

use super::traits::{Hook, HookContext, HookEvent};
use crate::checkpoint::{HookState, LoadPolicy};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

const NAME: &str = "param_freeze";

/// Which side of the pattern match is held back during the freeze phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternRole {
    /// Matched parameters are frozen until the threshold; the rest always train
    #[default]
    LateOpen,
    /// Only matched parameters train until the threshold; the rest are frozen
    TrainFirst,
}

/// Name partition computed once at `before_run`
#[derive(Debug)]
struct Partition {
    /// First matching pattern per parameter index
    group_of: Vec<Option<usize>>,
    /// Indices frozen during the freeze phase
    frozen: Vec<usize>,
    /// Names matching the frozen indices
    frozen_names: Vec<String>,
}

/// Keeps pattern-matched parameter groups frozen until `open_after_iterations`
///
/// The open/frozen state is a pure function of the iteration: groups are
/// open iff `iteration >= open_after_iterations`. The transition happens
/// once, at `before_iteration` of the threshold iteration, and never
/// reverses. Opening enables gradients and drops the optimizer's cached
/// momentum for the opened parameters.
///
/// # Example
///
/// ```
/// use segmentar::hooks::ParamFreezeController;
///
/// let hook = ParamFreezeController::new(2000, &[r"^backbone\.stem\."])?;
/// assert!(!hook.is_open());
/// # Ok::<(), segmentar::Error>(())
/// ```
#[derive(Debug)]
pub struct ParamFreezeController {
    open_after: usize,
    patterns: Vec<Regex>,
    role: PatternRole,
    partition: Option<Partition>,
    open_since: Option<usize>,
    restored: bool,
}

impl ParamFreezeController {
    /// Create a controller; patterns are compiled here
    pub fn new<S: AsRef<str>>(open_after_iterations: usize, name_patterns: &[S]) -> Result<Self> {
        let patterns = name_patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    Error::config(NAME, format!("invalid name pattern '{}': {e}", p.as_ref()))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            open_after: open_after_iterations,
            patterns,
            role: PatternRole::default(),
            partition: None,
            open_since: None,
            restored: false,
        })
    }

    /// Choose which side of the match is frozen
    pub fn with_role(mut self, role: PatternRole) -> Self {
        self.role = role;
        self
    }

    /// Iteration threshold
    pub fn open_after_iterations(&self) -> usize {
        self.open_after
    }

    /// Iteration at which the frozen groups opened, if they have
    pub fn open_since(&self) -> Option<usize> {
        self.open_since
    }

    /// Whether the frozen groups have been opened
    pub fn is_open(&self) -> bool {
        self.open_since.is_some()
    }

    /// Group index of a parameter position, once the partition exists
    pub fn group_of(&self, param_index: usize) -> Option<usize> {
        self.partition.as_ref().and_then(|p| p.group_of.get(param_index).copied().flatten())
    }

    /// Names held back during the freeze phase, once the partition exists
    pub fn frozen_names(&self) -> &[String] {
        self.partition.as_ref().map(|p| p.frozen_names.as_slice()).unwrap_or(&[])
    }

    fn build_partition(&self, ctx: &HookContext<'_>) -> Partition {
        let group_of: Vec<Option<usize>> = ctx
            .params
            .names()
            .iter()
            .map(|name| self.patterns.iter().position(|re| re.is_match(name)))
            .collect();
        let frozen: Vec<usize> = group_of
            .iter()
            .enumerate()
            .filter(|(_, g)| match self.role {
                PatternRole::LateOpen => g.is_some(),
                PatternRole::TrainFirst => g.is_none(),
            })
            .map(|(i, _)| i)
            .collect();
        let frozen_names = frozen.iter().map(|&i| ctx.params.names()[i].clone()).collect();
        Partition { group_of, frozen, frozen_names }
    }

    fn set_frozen_grad(&self, ctx: &mut HookContext<'_>, requires_grad: bool) {
        if let Some(partition) = &self.partition {
            for &i in &partition.frozen {
                if let Some(param) = ctx.params.by_index_mut(i) {
                    param.set_requires_grad(requires_grad);
                }
            }
        }
    }

    fn before_run(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let partition = self.build_partition(ctx);
        if partition.frozen.is_empty() {
            tracing::warn!(hook = NAME, "no parameter is frozen by the configured patterns");
        }
        self.partition = Some(partition);

        let iteration = ctx.iteration();
        if self.restored && self.open_since.is_some() && iteration < self.open_after {
            return Err(Error::state(
                NAME,
                format!(
                    "checkpoint marks groups open at iteration {iteration}, before threshold {}",
                    self.open_after
                ),
            ));
        }

        if iteration >= self.open_after {
            self.set_frozen_grad(ctx, true);
            self.open_since = Some(self.open_after);
        } else {
            self.set_frozen_grad(ctx, false);
            self.open_since = None;
            tracing::info!(
                hook = NAME,
                frozen = self.frozen_names().len(),
                open_after = self.open_after,
                "parameter groups frozen"
            );
        }
        Ok(())
    }

    fn before_iteration(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let Some(partition) = &self.partition else {
            return Err(Error::state(NAME, "before_iteration fired before before_run"));
        };
        if partition.group_of.len() != ctx.params.len() {
            return Err(Error::state(
                NAME,
                format!(
                    "parameter count changed from {} to {} after setup",
                    partition.group_of.len(),
                    ctx.params.len()
                ),
            ));
        }

        let iteration = ctx.iteration();
        if self.open_since.is_none() && iteration >= self.open_after {
            self.set_frozen_grad(ctx, true);
            let names = self.frozen_names().to_vec();
            ctx.optimizer.reset_state(&names);
            self.open_since = Some(iteration);
            tracing::info!(hook = NAME, iteration, opened = names.len(), "parameter groups opened");
        }
        Ok(())
    }
}

impl Hook for ParamFreezeController {
    fn name(&self) -> &str {
        NAME
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::BeforeRun, HookEvent::BeforeIteration]
    }

    fn handle(&mut self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        match event {
            HookEvent::BeforeRun => self.before_run(ctx),
            HookEvent::BeforeIteration => self.before_iteration(ctx),
            _ => Ok(()),
        }
    }

    fn state(&self) -> Option<HookState> {
        Some(HookState::ParamFreeze { open_since: self.open_since })
    }

    fn check_state(&self, state: &HookState, policy: LoadPolicy) -> Result<()> {
        let HookState::ParamFreeze { open_since } = state else {
            return Err(Error::state(
                NAME,
                format!("expected param_freeze state, found '{}'", state.kind()),
            ));
        };
        match open_since {
            Some(k) if *k != self.open_after && policy == LoadPolicy::Strict => Err(Error::state(
                NAME,
                format!("checkpoint opened groups at {k}, configured threshold is {}", self.open_after),
            )),
            _ => Ok(()),
        }
    }

    fn load_state(&mut self, state: HookState, policy: LoadPolicy) -> Result<()> {
        self.check_state(&state, policy)?;
        if let HookState::ParamFreeze { open_since } = state {
            match open_since {
                Some(k) if k != self.open_after => {
                    tracing::warn!(
                        hook = NAME,
                        saved = k,
                        configured = self.open_after,
                        "threshold changed since checkpoint; state recomputed from iteration"
                    );
                    self.open_since = None;
                }
                other => self.open_since = other,
            }
            self.restored = true;
        }
        Ok(())
    }
}
