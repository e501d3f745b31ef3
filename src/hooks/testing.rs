//! Owned run state for exercising hooks in isolation

use super::HookContext;
use crate::model::{LossMap, LossWeights, Param, ParamStore};
use crate::optim::SGD;
use crate::runner::EventClock;

pub(crate) const PARAM_NAMES: [&str; 4] = [
    "backbone.stem.weight",
    "backbone.aggregator.weight",
    "neck.fuse.weight",
    "decode_head.conv_seg.weight",
];

pub(crate) struct Fixture {
    pub clock: EventClock,
    pub params: ParamStore,
    pub optimizer: SGD,
    pub losses: LossMap,
    pub weights: LossWeights,
}

impl Default for Fixture {
    fn default() -> Self {
        let mut params = ParamStore::new();
        for (i, name) in PARAM_NAMES.iter().enumerate() {
            params.insert(*name, Param::from_vec(vec![i as f32; 2])).unwrap();
        }
        Self {
            clock: EventClock::new(10_000),
            params,
            optimizer: SGD::new(0.1, 0.9, 0.0),
            losses: LossMap::new(),
            weights: LossWeights::new(),
        }
    }
}

impl Fixture {
    /// Move the clock forward to `iteration`
    pub fn at(&mut self, iteration: usize) -> &mut Self {
        while self.clock.iteration() < iteration {
            self.clock.advance();
        }
        self
    }

    pub fn ctx(&mut self) -> HookContext<'_> {
        HookContext {
            clock: &self.clock,
            params: &mut self.params,
            optimizer: &mut self.optimizer,
            losses: &self.losses,
            weights: &self.weights,
            combined_loss: None,
        }
    }

    pub fn requires_grad(&self, name: &str) -> bool {
        self.params.get(name).map(Param::requires_grad).unwrap_or(false)
    }
}
