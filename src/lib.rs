//! Segmentar: hook-driven training orchestration for segmentation models
//!
//! The crate drives a long-running, iteration-based training loop whose
//! behavior is changed over time by stateful lifecycle hooks:
//!
//! - [`runner::TrainingRunner`] owns the [`runner::EventClock`] and runs the
//!   per-iteration pipeline (fetch → forward → reweight → backward → step)
//! - [`hooks::HookRegistry`] dispatches lifecycle events by priority, then
//!   registration order
//! - [`hooks::ParamFreezeController`] keeps pattern-matched parameter groups
//!   frozen until an iteration threshold
//! - [`hooks::EmaHook`] maintains exponentially averaged shadow parameters
//! - [`loss::LossReweighter`] combines per-head losses into one scalar
//! - [`data::DatasetStatCollector`] computes margin calibration statistics
//!   once before training
//!
//! The numeric backend is an external collaborator reached through the
//! [`model::Segmentor`] and [`optim::Optimizer`] traits.
//!
//! # Example
//!
//! ```no_run
//! use segmentar::hooks::{EmaHook, Priority};
//! use segmentar::model::{SyntheticBatch, SyntheticSegmentor};
//! use segmentar::optim::SGD;
//! use segmentar::runner::{RunnerConfig, TrainingRunner};
//!
//! let model = SyntheticSegmentor::default();
//! let optimizer = SGD::new(0.01, 0.9, 0.0);
//! let config = RunnerConfig::new(100);
//!
//! let mut runner = TrainingRunner::new(model, Box::new(optimizer), config);
//! runner.register_hook(EmaHook::new(0.99, 10)?, Priority::Normal)?;
//!
//! let result = runner.run(|_clock| Ok(SyntheticBatch::default()))?;
//! println!("finished at iteration {}", result.final_iteration);
//! # Ok::<(), segmentar::Error>(())
//! ```

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod dist;
pub mod error;
pub mod hooks;
pub mod loss;
pub mod model;
pub mod optim;
pub mod runner;

pub use error::{Error, Result};
