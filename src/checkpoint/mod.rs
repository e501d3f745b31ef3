//! Checkpoint persistence
//!
//! A checkpoint holds the event clock, model parameters, optimizer state
//! and the internal state of every stateful hook. Loading supports a strict
//! policy (any key mismatch fails) and a lenient one (match by name, report
//! the rest).

mod format;
mod load;
mod policy;
mod save;

pub use format::{Checkpoint, CheckpointFormat, HookState, CHECKPOINT_FORMAT_VERSION};
pub use load::load_checkpoint;
pub use policy::{LoadPolicy, LoadReport};
pub use save::save_checkpoint;
