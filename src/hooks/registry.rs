//! Hook registry dispatching lifecycle events to ordered hooks

use super::traits::{Hook, HookContext, HookEvent, Priority};
use crate::checkpoint::{HookState, LoadPolicy, LoadReport};
use crate::{Error, Result};
use std::collections::BTreeMap;

struct Entry {
    hook: Box<dyn Hook>,
    priority: Priority,
}

/// Ordered collection of hooks
///
/// Dispatch order is priority descending, then registration order. The
/// order is fixed at registration time.
#[derive(Default)]
pub struct HookRegistry {
    entries: Vec<Entry>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook; hook names must be unique
    pub fn register<H: Hook + 'static>(&mut self, hook: H, priority: Priority) -> Result<()> {
        self.register_boxed(Box::new(hook), priority)
    }

    /// Register an already boxed hook
    pub fn register_boxed(&mut self, hook: Box<dyn Hook>, priority: Priority) -> Result<()> {
        if self.entries.iter().any(|e| e.hook.name() == hook.name()) {
            return Err(Error::config(
                "hook_registry",
                format!("a hook named '{}' is already registered", hook.name()),
            ));
        }
        // After every entry of equal or higher priority, keeping registration order stable
        let pos = self.entries.partition_point(|e| e.priority <= priority);
        self.entries.insert(pos, Entry { hook, priority });
        Ok(())
    }

    /// Check if no hooks are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get number of hooks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Hook names in dispatch order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.hook.name()).collect()
    }

    /// Priority of a registered hook
    pub fn priority_of(&self, name: &str) -> Option<Priority> {
        self.entries.iter().find(|e| e.hook.name() == name).map(|e| e.priority)
    }

    /// Dispatch `event` to every subscribed hook in order
    ///
    /// The first failing hook aborts the dispatch; hooks after it do not see
    /// the event. The error names the hook, the event and the iteration.
    pub fn fire(&mut self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        for entry in &mut self.entries {
            if !entry.hook.subscribes_to(event) {
                continue;
            }
            tracing::trace!(hook = entry.hook.name(), %event, iteration = ctx.iteration(), "dispatch");
            entry.hook.handle(event, ctx).map_err(|e| Error::Hook {
                hook: entry.hook.name().to_string(),
                event,
                iteration: ctx.iteration(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    /// Current state of one hook
    pub fn state_of(&self, name: &str) -> Option<HookState> {
        self.entries.iter().find(|e| e.hook.name() == name).and_then(|e| e.hook.state())
    }

    /// States of every stateful hook keyed by hook name
    pub fn states(&self) -> BTreeMap<String, HookState> {
        self.entries
            .iter()
            .filter_map(|e| e.hook.state().map(|s| (e.hook.name().to_string(), s)))
            .collect()
    }

    /// Restore hook states from a checkpoint
    ///
    /// Under [`LoadPolicy::Strict`] every stateful hook must find its state
    /// and every saved state must belong to a registered hook. These checks
    /// and each hook's own [`Hook::check_state`] run before any hook is
    /// touched. Under [`LoadPolicy::Lenient`] the mismatches are reported
    /// and skipped.
    pub fn load_states(
        &mut self,
        states: &BTreeMap<String, HookState>,
        policy: LoadPolicy,
    ) -> Result<LoadReport> {
        let report = self.check_states(states, policy)?;
        self.apply_states(&report, states, policy)?;
        Ok(report)
    }

    /// Hand each hook the state a prior [`HookRegistry::check_states`] accepted
    pub(crate) fn apply_states(
        &mut self,
        report: &LoadReport,
        states: &BTreeMap<String, HookState>,
        policy: LoadPolicy,
    ) -> Result<()> {
        for entry in &mut self.entries {
            let name = entry.hook.name().to_string();
            if !report.loaded.contains(&name) {
                continue;
            }
            if let Some(state) = states.get(&name) {
                entry.hook.load_state(state.clone(), policy)?;
            }
        }
        Ok(())
    }

    /// Match saved states to registered hooks and let each hook check its
    /// own state, without applying anything
    pub fn check_states(&self, states: &BTreeMap<String, HookState>, policy: LoadPolicy) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for entry in &self.entries {
            let name = entry.hook.name();
            let stateful = entry.hook.state().is_some();
            match (stateful, states.contains_key(name)) {
                (true, true) => report.loaded.push(name.to_string()),
                (true, false) => report.missing.push(name.to_string()),
                (false, true) => report.unexpected.push(name.to_string()),
                (false, false) => {}
            }
        }
        for name in states.keys() {
            if !self.entries.iter().any(|e| e.hook.name() == name) {
                report.unexpected.push(name.clone());
            }
        }

        report.enforce("hook_states", policy)?;

        for entry in &self.entries {
            let name = entry.hook.name();
            if !report.loaded.iter().any(|n| n == name) {
                continue;
            }
            if let Some(state) = states.get(name) {
                entry.hook.check_state(state, policy)?;
            }
        }
        Ok(report)
    }
}
