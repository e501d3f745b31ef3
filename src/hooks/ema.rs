//! Exponential moving average of model parameters

use super::traits::{Hook, HookContext, HookEvent};
use crate::checkpoint::{HookState, LoadPolicy, LoadReport};
use crate::model::ParamStore;
use crate::{Error, Result};
use ndarray::Array1;
use std::collections::BTreeMap;

const NAME: &str = "ema";

/// Maintains a shadow copy of the parameters
///
/// After every `interval` iterations:
/// - before `warmup_iterations`: `shadow = value`
/// - afterwards: `shadow = momentum * shadow + (1 - momentum) * value`
///
/// The shadow covers every parameter present at `before_run`. Adding,
/// removing or reshaping a parameter afterwards is a state-consistency
/// error.
#[derive(Debug)]
pub struct EmaHook {
    momentum: f32,
    warmup_iterations: usize,
    interval: usize,
    names: Vec<String>,
    shadow: Vec<Array1<f32>>,
    restored: Option<(BTreeMap<String, Vec<f32>>, LoadPolicy)>,
}

impl EmaHook {
    /// Create an EMA hook; `momentum` must lie in `[0, 1)`
    pub fn new(momentum: f32, warmup_iterations: usize) -> Result<Self> {
        if !(0.0..1.0).contains(&momentum) {
            return Err(Error::config(NAME, format!("momentum must lie in [0, 1), got {momentum}")));
        }
        Ok(Self {
            momentum,
            warmup_iterations,
            interval: 1,
            names: Vec::new(),
            shadow: Vec::new(),
            restored: None,
        })
    }

    /// Update every `interval` iterations instead of every iteration
    pub fn with_interval(mut self, interval: usize) -> Result<Self> {
        if interval == 0 {
            return Err(Error::config(NAME, "interval must be at least 1"));
        }
        self.interval = interval;
        Ok(self)
    }

    /// Decay factor
    pub fn momentum(&self) -> f32 {
        self.momentum
    }

    /// Shadow value of one parameter
    pub fn shadow_of(&self, name: &str) -> Option<&Array1<f32>> {
        self.names.iter().position(|n| n == name).map(|i| &self.shadow[i])
    }

    /// Copy of the shadow values keyed by parameter name
    pub fn shadow_snapshot(&self) -> BTreeMap<String, Vec<f32>> {
        self.names.iter().cloned().zip(self.shadow.iter().map(|s| s.to_vec())).collect()
    }

    /// Write the shadow values into `params`, e.g. an evaluation copy of the model
    pub fn apply_to(&self, params: &mut ParamStore) -> Result<()> {
        self.check_drift(params)?;
        for (i, (_, param)) in params.iter_mut().enumerate() {
            param.data_mut().assign(&self.shadow[i]);
        }
        Ok(())
    }

    fn check_drift(&self, params: &ParamStore) -> Result<()> {
        if params.len() != self.names.len() {
            return Err(Error::state(
                NAME,
                format!("tracking {} parameters, model now has {}", self.names.len(), params.len()),
            ));
        }
        for ((name, param), (tracked, shadow)) in
            params.iter().zip(self.names.iter().zip(&self.shadow))
        {
            if name != tracked {
                return Err(Error::state(
                    NAME,
                    format!("parameter '{tracked}' replaced by '{name}' after setup"),
                ));
            }
            if param.len() != shadow.len() {
                return Err(Error::state(
                    NAME,
                    format!(
                        "parameter '{name}' resized from {} to {} after setup",
                        shadow.len(),
                        param.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn before_run(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        self.names = ctx.params.names().to_vec();
        self.shadow = ctx.params.iter().map(|(_, p)| p.data().clone()).collect();

        let Some((saved, policy)) = self.restored.take() else {
            tracing::debug!(hook = NAME, params = self.names.len(), "shadow initialized");
            return Ok(());
        };

        let mut report = LoadReport::default();
        for (name, shadow) in self.names.iter().zip(&self.shadow) {
            match saved.get(name) {
                Some(v) if v.len() == shadow.len() => report.loaded.push(name.clone()),
                Some(v) => report.mismatched.push(format!(
                    "{name} (expected {} values, found {})",
                    shadow.len(),
                    v.len()
                )),
                None => report.missing.push(name.clone()),
            }
        }
        report.unexpected =
            saved.keys().filter(|k| !self.names.contains(*k)).cloned().collect();
        report.enforce(NAME, policy)?;

        for (name, shadow) in self.names.iter().zip(self.shadow.iter_mut()) {
            if report.loaded.contains(name) {
                if let Some(v) = saved.get(name) {
                    *shadow = Array1::from(v.clone());
                }
            }
        }
        tracing::debug!(hook = NAME, loaded = report.loaded.len(), "shadow restored");
        Ok(())
    }

    fn after_iteration(&mut self, ctx: &mut HookContext<'_>) -> Result<()> {
        let iteration = ctx.iteration();
        if (iteration + 1) % self.interval != 0 {
            return Ok(());
        }
        self.check_drift(&*ctx.params)?;

        if iteration < self.warmup_iterations {
            for (shadow, (_, param)) in self.shadow.iter_mut().zip(ctx.params.iter()) {
                shadow.assign(param.data());
            }
        } else {
            let m = self.momentum;
            for (shadow, (_, param)) in self.shadow.iter_mut().zip(ctx.params.iter()) {
                shadow.zip_mut_with(param.data(), |s, &v| *s = m * *s + (1.0 - m) * v);
            }
        }
        Ok(())
    }
}

impl Hook for EmaHook {
    fn name(&self) -> &str {
        NAME
    }

    fn events(&self) -> &[HookEvent] {
        &[HookEvent::BeforeRun, HookEvent::AfterIteration]
    }

    fn handle(&mut self, event: HookEvent, ctx: &mut HookContext<'_>) -> Result<()> {
        match event {
            HookEvent::BeforeRun => self.before_run(ctx),
            HookEvent::AfterIteration => self.after_iteration(ctx),
            _ => Ok(()),
        }
    }

    fn state(&self) -> Option<HookState> {
        Some(HookState::Ema { shadow_values: self.shadow_snapshot() })
    }

    fn check_state(&self, state: &HookState, _policy: LoadPolicy) -> Result<()> {
        let HookState::Ema { shadow_values } = state else {
            return Err(Error::state(NAME, format!("expected ema state, found '{}'", state.kind())));
        };
        if let Some((name, _)) =
            shadow_values.iter().find(|(_, v)| v.iter().any(|x| !x.is_finite()))
        {
            return Err(Error::state(NAME, format!("non-finite shadow value for '{name}'")));
        }
        Ok(())
    }

    fn load_state(&mut self, state: HookState, policy: LoadPolicy) -> Result<()> {
        self.check_state(&state, policy)?;
        if let HookState::Ema { shadow_values } = state {
            self.restored = Some((shadow_values, policy));
        }
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::hooks::testing::Fixture;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_zero_momentum_tracks_value(values in prop::collection::vec(-100.0f32..100.0, 1..20)) {
            let mut hook = EmaHook::new(0.0, 0).unwrap();
            let mut fx = Fixture::default();
            hook.handle(HookEvent::BeforeRun, &mut fx.ctx()).unwrap();
            for (i, v) in values.iter().enumerate() {
                fx.at(i);
                fx.params.get_mut("neck.fuse.weight").unwrap().data_mut().fill(*v);
                hook.handle(HookEvent::AfterIteration, &mut fx.ctx()).unwrap();
                prop_assert_eq!(hook.shadow_of("neck.fuse.weight").unwrap()[0], *v);
            }
        }

        #[test]
        fn prop_decay_recurrence_holds(
            momentum in 0.0f32..0.99,
            values in prop::collection::vec(-10.0f32..10.0, 1..20),
        ) {
            let mut hook = EmaHook::new(momentum, 0).unwrap();
            let mut fx = Fixture::default();
            hook.handle(HookEvent::BeforeRun, &mut fx.ctx()).unwrap();
            for (i, v) in values.iter().enumerate() {
                let prev = hook.shadow_of("backbone.stem.weight").unwrap()[0];
                fx.at(i);
                fx.params.get_mut("backbone.stem.weight").unwrap().data_mut().fill(*v);
                hook.handle(HookEvent::AfterIteration, &mut fx.ctx()).unwrap();
                let expected = momentum * prev + (1.0 - momentum) * v;
                prop_assert!((hook.shadow_of("backbone.stem.weight").unwrap()[0] - expected).abs() < 1e-4);
            }
        }
    }
}
