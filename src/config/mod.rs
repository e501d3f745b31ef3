//! Declarative run configuration
//!
//! A YAML run specification is parsed into [`RunSpec`], validated, and
//! turned into a fully wired [`crate::runner::TrainingRunner`].

mod builder;
mod cli;
mod loader;
mod schema;
pub mod validate;

pub use builder::{
    build_optimizer, build_runner, build_runner_config, build_stat_collector, compile_ignore_keys,
    restore_from_spec,
};
pub use cli::{Cli, Command, InspectArgs, TrainArgs, ValidateArgs};
pub use loader::{load_config, parse_config};
pub use schema::{CalibrationSpec, EmaSpec, FreezeSpec, OptimSpec, RunSpec, RunnerSpec};
pub use validate::{validate_config, ValidationError};
