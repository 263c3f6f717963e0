// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands `train`, `eval` and `stats`
// and all their configurable flags.
//
// Flags shared by every command live in `CommonArgs` and are
// flattened into each subcommand. Enum flags use the same
// spelling as config.json (e.g. `--model-var-type learned_range`).
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::{run_config::RunConfig, train_use_case::TrainConfig};
use crate::data::cifar::Split;
use crate::domain::options::{
    BackendKind, KarrasMethod, LossType, ModelMeanType, ModelVarType, SamplerKind,
};
use crate::infra::world::parse_gpus;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a diffusion model on CIFAR-10
    Train(TrainArgs),

    /// Score the checkpoint of a training run with IS and FID
    Eval(EvalArgs),

    /// Compute reference Inception statistics of a CIFAR-10 split
    Stats(StatsArgs),
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Root directory for runs
    #[arg(long, default_value = "results")]
    pub result_dir: PathBuf,

    /// Comma-separated device indices, one worker per entry
    #[arg(long, default_value = "0")]
    pub gpus: String,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Images per optimisation step, and per sampling chunk
    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,

    /// Number of generated images used for IS / FID
    #[arg(long, default_value_t = 1000)]
    pub n_samples_eval: usize,

    /// Sampling steps for DDIM and Karras (DDPM always uses all timesteps)
    #[arg(long, default_value_t = 50)]
    pub n_sampler_steps: usize,

    #[arg(long, value_enum, default_value_t = ModelMeanType::Eps)]
    pub model_mean_type: ModelMeanType,

    #[arg(long, value_enum, default_value_t = LossType::L2)]
    pub loss_type: LossType,

    #[arg(long, value_enum, default_value_t = ModelVarType::FixedSmall)]
    pub model_var_type: ModelVarType,

    #[arg(long, value_enum, default_value_t = SamplerKind::Karras)]
    pub sampler: SamplerKind,

    /// Integration rule of the Karras sampler
    #[arg(long, value_enum, default_value_t = KarrasMethod::Heun)]
    pub karras_sampler: KarrasMethod,

    /// 0 makes DDIM deterministic
    #[arg(long, default_value_t = 0.0)]
    pub ddim_eta: f64,

    /// Directory holding the CIFAR-10 binary batches
    #[arg(long, default_value = "data/cifar10")]
    pub dataset_dir: PathBuf,

    /// Directory of the reference FID statistics
    #[arg(long, default_value = "data/cifar10/stats")]
    pub dataset_stats_path: PathBuf,

    /// Inception-v3 weights converted to safetensors
    #[arg(long, default_value = "data/pt_inception-2015-12-05.safetensors")]
    pub inception_weights: PathBuf,

    #[arg(long, default_value_t = 50)]
    pub inception_batch_size: usize,

    /// Seeds tensor sampling, timestep draws, shuffling and flips
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Convert CLI flags into the application-layer RunConfig.
/// Fails on a malformed `--gpus` list or unusable sizes.
impl TryFrom<CommonArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(a: CommonArgs) -> Result<Self> {
        let run = RunConfig {
            result_dir:           a.result_dir,
            gpus:                 parse_gpus(&a.gpus)?,
            backend:              a.backend,
            batch_size:           a.batch_size,
            n_samples_eval:       a.n_samples_eval,
            n_sampler_steps:      a.n_sampler_steps,
            model_mean_type:      a.model_mean_type,
            loss_type:            a.loss_type,
            model_var_type:       a.model_var_type,
            sampler:              a.sampler,
            karras_sampler:       a.karras_sampler,
            ddim_eta:             a.ddim_eta,
            dataset_dir:          a.dataset_dir,
            dataset_stats_path:   a.dataset_stats_path,
            inception_weights:    a.inception_weights,
            inception_batch_size: a.inception_batch_size,
            seed:                 a.seed,
        };
        run.validate()?;
        Ok(run)
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Images in each sample grid
    #[arg(long, default_value_t = 256)]
    pub n_samples: usize,

    /// Total optimisation steps
    #[arg(long, default_value_t = 20_000)]
    pub n_steps: usize,

    /// Sample, checkpoint and evaluate every this many steps
    #[arg(long, default_value_t = 1000)]
    pub samples_per_steps: usize,

    #[arg(long, default_value_t = 2e-4)]
    pub lr: f64,

    /// Linear warmup length in steps
    #[arg(long, default_value_t = 500)]
    pub warmup: usize,

    #[arg(long, default_value_t = 0.9999)]
    pub ema_decay: f64,

    /// Data loading threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    /// Append to train_log.csv every this many steps
    #[arg(long, default_value_t = 100)]
    pub log_every: usize,

    /// Continue from the run's checkpoint instead of starting over
    #[arg(long)]
    pub resume: bool,
}

impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let run = RunConfig::try_from(a.common)?;
        let cfg = TrainConfig {
            n_samples:         a.n_samples,
            n_steps:           a.n_steps,
            samples_per_steps: a.samples_per_steps,
            lr:                a.lr,
            warmup:            a.warmup,
            ema_decay:         a.ema_decay,
            num_workers:       a.num_workers,
            log_every:         a.log_every,
            resume:            a.resume,
            ..TrainConfig::new(run)
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// All arguments for the `eval` command.
#[derive(Args, Debug)]
pub struct EvalArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Score the EMA weights instead of the raw model
    #[arg(long)]
    pub ema: bool,

    /// Sampler the run was trained with, which names its directory
    /// (default: --sampler)
    #[arg(long, value_enum)]
    pub train_sampler: Option<SamplerKind>,
}

/// All arguments for the `stats` command.
#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, value_enum, default_value_t = Split::Train)]
    pub split: Split,

    /// Output file (default: <dataset-stats-path>/cifar10.<split>.safetensors)
    #[arg(long)]
    pub output: Option<PathBuf>,
}
