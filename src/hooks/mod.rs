//! Lifecycle hooks for the training runner
//!
//! Hooks subscribe to lifecycle events and are dispatched by the
//! [`HookRegistry`] in priority order. Every hook receives an explicit
//! [`HookContext`] holding the clock, parameters, optimizer and the latest
//! losses; there is no ambient training state.

mod ema;
mod freeze;
mod logger;
mod lr;
mod registry;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use ema::EmaHook;
pub use freeze::{ParamFreezeController, PatternRole};
pub use logger::LoggerHook;
pub use lr::{LrSchedulerHook, StepLrHook};
pub use registry::HookRegistry;
pub use traits::{Hook, HookContext, HookEvent, Priority};
