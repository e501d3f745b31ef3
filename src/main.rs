//! Segmentar CLI
//!
//! Runs the training loop on the synthetic reference segmentor from a YAML
//! run specification.
//!
//! # Usage
//!
//! ```bash
//! # Train from config
//! segmentar train run.yaml
//!
//! # Resume a run with a longer schedule
//! segmentar train run.yaml --resume work_dir/iter_1000.json --max-iters 4000
//!
//! # Validate config
//! segmentar validate run.yaml
//!
//! # Summarize a checkpoint
//! segmentar inspect work_dir/iter_1000.json
//! ```

use clap::Parser;
use segmentar::cli::{init_tracing, run_command, Cli, LogLevel};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(LogLevel::from_flags(cli.quiet, cli.verbose));

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
