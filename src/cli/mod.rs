// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train` — trains a U-Net with periodic sampling and scoring
//   2. `eval`  — scores the checkpoint of a run (raw or EMA weights)
//   3. `stats` — computes the reference FID statistics of a split
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, StatsArgs, TrainArgs};

use crate::application::{
    eval_use_case::EvalUseCase,
    run_config::RunConfig,
    stats_use_case::StatsUseCase,
    train_use_case::{TrainConfig, TrainUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "diffusion-lab",
    version = "0.1.0",
    about = "Train diffusion models on CIFAR-10 and score them with IS / FID."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case. Never computes anything itself.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
            Commands::Stats(args) => run_stats(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = TrainConfig::try_from(args)?;
    tracing::info!("Starting training for {} steps", config.n_steps);

    TrainUseCase::new(config).execute()?;

    println!("Training complete. Checkpoint saved.");
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    let config = RunConfig::try_from(args.common)?;
    // scores are printed by the evaluator
    EvalUseCase::new(config, args.ema, args.train_sampler).execute()?;
    Ok(())
}

fn run_stats(args: StatsArgs) -> Result<()> {
    let config = RunConfig::try_from(args.common)?;
    let path   = StatsUseCase::new(config, args.split, args.output).execute()?;
    println!("Statistics written to '{}'", path.display());
    Ok(())
}
