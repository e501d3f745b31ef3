//! Training runner: the event clock and the iteration loop

mod clock;
mod core;
mod result;
mod run_loop;

#[cfg(test)]
mod tests;

pub use self::core::{RunnerConfig, TrainingRunner};
pub use clock::EventClock;
pub use result::RunResult;
