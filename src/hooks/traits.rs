//! Core traits and types for the hook system
//!
//! - `HookEvent` - the lifecycle events a hook can subscribe to
//! - `Priority` - dispatch ordering between hooks
//! - `HookContext` - mutable run state passed to every hook
//! - `Hook` - the trait all hooks implement

use crate::checkpoint::{HookState, LoadPolicy};
use crate::model::{LossMap, LossWeights, ParamStore};
use crate::optim::Optimizer;
use crate::runner::EventClock;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle events fired by the runner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    /// Once, before the first iteration (after any resume)
    BeforeRun,
    /// Before the forward pass of every iteration
    BeforeIteration,
    /// After the optimizer step of every iteration
    AfterIteration,
    /// Once, after the last iteration
    AfterRun,
    /// Before a checkpoint is assembled
    BeforeSaveCheckpoint,
    /// After a checkpoint has been restored
    AfterLoadCheckpoint,
}

impl HookEvent {
    /// Every event, in lifecycle order
    pub const ALL: [HookEvent; 6] = [
        Self::BeforeRun,
        Self::BeforeIteration,
        Self::AfterIteration,
        Self::AfterRun,
        Self::BeforeSaveCheckpoint,
        Self::AfterLoadCheckpoint,
    ];

    /// Event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeRun => "before_run",
            Self::BeforeIteration => "before_iteration",
            Self::AfterIteration => "after_iteration",
            Self::AfterRun => "after_run",
            Self::BeforeSaveCheckpoint => "before_save_checkpoint",
            Self::AfterLoadCheckpoint => "after_load_checkpoint",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook priority; higher priorities are dispatched first
///
/// Variants are declared from highest to lowest, so the derived ordering
/// sorts dispatch order ascending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Highest,
    VeryHigh,
    High,
    AboveNormal,
    #[default]
    Normal,
    BelowNormal,
    Low,
    VeryLow,
    Lowest,
}

impl Priority {
    /// Numeric level, 0 (highest) to 100 (lowest)
    pub fn value(&self) -> u8 {
        match self {
            Self::Highest => 0,
            Self::VeryHigh => 10,
            Self::High => 30,
            Self::AboveNormal => 40,
            Self::Normal => 50,
            Self::BelowNormal => 60,
            Self::Low => 70,
            Self::VeryLow => 90,
            Self::Lowest => 100,
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HIGHEST" => Ok(Self::Highest),
            "VERY_HIGH" => Ok(Self::VeryHigh),
            "HIGH" => Ok(Self::High),
            "ABOVE_NORMAL" => Ok(Self::AboveNormal),
            "NORMAL" => Ok(Self::Normal),
            "BELOW_NORMAL" => Ok(Self::BelowNormal),
            "LOW" => Ok(Self::Low),
            "VERY_LOW" => Ok(Self::VeryLow),
            "LOWEST" => Ok(Self::Lowest),
            other => Err(Error::config("priority", format!("unknown priority '{other}'"))),
        }
    }
}

/// Run state passed to hooks
///
/// The context borrows the runner's state for the duration of one dispatch.
/// It never exposes the registry, so a hook cannot add, remove or reorder
/// hooks while an event is being dispatched.
pub struct HookContext<'a> {
    /// Iteration and epoch counters
    pub clock: &'a EventClock,
    /// Model parameters
    pub params: &'a mut ParamStore,
    /// Optimizer
    pub optimizer: &'a mut dyn Optimizer,
    /// Raw per-head losses of the latest iteration
    pub losses: &'a LossMap,
    /// Weights used to combine the latest losses
    pub weights: &'a LossWeights,
    /// Combined loss of the latest iteration
    pub combined_loss: Option<f32>,
}

impl HookContext<'_> {
    /// Current iteration
    pub fn iteration(&self) -> usize {
        self.clock.iteration()
    }
}

/// Trait for lifecycle hooks
///
/// A hook declares the events it subscribes to and handles them through a
/// single entry point. Hooks with internal state that must survive a resume
/// return it from [`Hook::state`] and accept it back in [`Hook::load_state`].
pub trait Hook: Send {
    /// Unique name, used as the checkpoint key and in error messages
    fn name(&self) -> &str;

    /// Events this hook reacts to
    fn events(&self) -> &[HookEvent];

    /// Handle one event
    fn handle(&mut self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()>;

    /// Persistable state, `None` for stateless hooks
    fn state(&self) -> Option<HookState> {
        None
    }

    /// Check that `state` would load under `policy` without applying it
    fn check_state(&self, _state: &HookState, _policy: LoadPolicy) -> Result<()> {
        Ok(())
    }

    /// Restore state captured by [`Hook::state`]
    fn load_state(&mut self, state: HookState, _policy: LoadPolicy) -> Result<()> {
        Err(Error::state(
            self.name(),
            format!("hook has no persisted state but checkpoint holds '{}'", state.kind()),
        ))
    }

    /// Check whether the hook reacts to `event`
    fn subscribes_to(&self, event: HookEvent) -> bool {
        self.events().contains(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        assert_eq!(HookEvent::BeforeIteration.to_string(), "before_iteration");
        assert_eq!(HookEvent::AfterLoadCheckpoint.to_string(), "after_load_checkpoint");
        assert_eq!(HookEvent::ALL.len(), 6);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Highest < Priority::VeryHigh);
        assert!(Priority::Normal < Priority::Lowest);
        assert_eq!(Priority::default(), Priority::Normal);
        let mut values: Vec<u8> = [Priority::Low, Priority::Highest, Priority::Normal]
            .iter()
            .map(Priority::value)
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 50, 70]);
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("VERY_HIGH".parse::<Priority>().unwrap(), Priority::VeryHigh);
        assert_eq!("below_normal".parse::<Priority>().unwrap(), Priority::BelowNormal);
        assert!("URGENT".parse::<Priority>().unwrap_err().is_config());
    }

    #[test]
    fn test_priority_serde() {
        let json = serde_json::to_string(&Priority::AboveNormal).unwrap();
        assert_eq!(json, r#""ABOVE_NORMAL""#);
        let back: Priority = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Priority::AboveNormal);
    }

    #[test]
    fn test_stateless_hook_rejects_state() {
        struct Noop;
        impl Hook for Noop {
            fn name(&self) -> &str {
                "noop"
            }
            fn events(&self) -> &[HookEvent] {
                &[HookEvent::AfterRun]
            }
            fn handle(&mut self, _: HookEvent, _: &mut HookContext<'_>) -> Result<()> {
                Ok(())
            }
        }

        let mut hook = Noop;
        assert!(hook.state().is_none());
        assert!(hook.subscribes_to(HookEvent::AfterRun));
        assert!(!hook.subscribes_to(HookEvent::BeforeRun));
        let err = hook
            .load_state(HookState::ParamFreeze { open_since: None }, LoadPolicy::Strict)
            .unwrap_err();
        assert!(err.is_state_consistency());
    }
}
