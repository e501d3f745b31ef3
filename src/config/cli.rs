//! Core CLI types - Cli, Command, and argument structs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Segmentar: hook-driven training orchestration for segmentation models
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "segmentar")]
#[command(version)]
#[command(about = "Iteration-based segmentation training with freeze, EMA and loss reweighting hooks")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train the synthetic reference segmentor from YAML configuration
    Train(TrainArgs),

    /// Validate a configuration file without training
    Validate(ValidateArgs),

    /// Summarize a checkpoint
    Inspect(InspectArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override number of iterations
    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Resume training from checkpoint
    #[arg(short, long)]
    pub resume: Option<PathBuf>,

    /// Override checkpoint directory
    #[arg(short, long)]
    pub work_dir: Option<PathBuf>,

    /// Dry run (validate config but don't train)
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the inspect command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    /// Path to checkpoint file
    #[arg(value_name = "CHECKPOINT")]
    pub checkpoint: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_command() {
        let cli = Cli::try_parse_from([
            "segmentar",
            "train",
            "run.yaml",
            "--max-iters",
            "100",
            "--resume",
            "work_dir/iter_50.json",
        ])
        .unwrap();
        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.config, PathBuf::from("run.yaml"));
                assert_eq!(args.max_iters, Some(100));
                assert_eq!(args.resume, Some(PathBuf::from("work_dir/iter_50.json")));
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["segmentar", "validate", "run.yaml", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);
        assert_eq!(cli.command, Command::Validate(ValidateArgs { config: PathBuf::from("run.yaml") }));
    }

    #[test]
    fn test_parse_inspect_command() {
        let cli = Cli::try_parse_from(["segmentar", "-q", "inspect", "iter_1000.json"]).unwrap();
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Inspect(_)));
    }

    #[test]
    fn test_missing_config_fails() {
        assert!(Cli::try_parse_from(["segmentar", "train"]).is_err());
    }
}
