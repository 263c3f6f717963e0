// ============================================================
// Layer 2 — EvalUseCase
// ============================================================
// Scores a trained run:
//
//   Step 1: Find the run, read its config.json (Layer 6 - infra)
//   Step 2: Rebuild model + EMA, load weights   (Layer 5/6)
//   Step 3: Load Inception and statistics       (Layer 7 - scoring)
//   Step 4: Sample, score, print, log           (Layer 5 - ml)
//
// The run directory is named after the sampler used in training
// (`--train-sampler`, default `--sampler`). The architecture and the
// mean / variance / loss types come from config.json. Sampler settings
// come from the command line, so one checkpoint can be scored with any
// sampler.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::backend::{NdArray, Wgpu};

use crate::application::{run_config::RunConfig, train_use_case::TrainConfig};
use crate::data::cifar::{CIFAR_CHANNELS, CIFAR_SIDE};
use crate::diffusion::sampler::DiffusionSampler;
use crate::domain::options::{BackendKind, SamplerKind};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EvalRow, MetricsLogger},
    world::{seed_everything, ComputeBackend, World},
};
use crate::ml::evaluator::{Evaluator, Weights};
use crate::scoring::{InceptionScorer, Scores};

/// A located training run and the settings it is evaluated with.
#[derive(Debug, Clone)]
pub struct EvalPlan {
    pub run_dir: PathBuf,
    /// Command-line settings with the trained diffusion types applied
    pub run:     RunConfig,
    pub trained: TrainConfig,
}

impl EvalPlan {
    /// eval_log.csv goes next to the training logs.
    pub fn output_dir(&self) -> PathBuf {
        self.run_dir.join("outputs")
    }
}

pub struct EvalUseCase {
    config:        RunConfig,
    ema:           bool,
    train_sampler: Option<SamplerKind>,
}

impl EvalUseCase {
    pub fn new(config: RunConfig, ema: bool, train_sampler: Option<SamplerKind>) -> Self {
        Self { config, ema, train_sampler }
    }

    pub fn run_dir(&self) -> PathBuf {
        self.config.run_dir_for(self.train_sampler.unwrap_or(self.config.sampler))
    }

    /// Locate the run and merge its config.json with the command line.
    pub fn plan(&self) -> Result<EvalPlan> {
        let run_dir = self.run_dir();
        if !run_dir.is_dir() {
            bail!(
                "No training run at '{}'. If it was trained with another sampler, pass --train-sampler.",
                run_dir.display()
            );
        }
        let trained: TrainConfig = CheckpointManager::new(&run_dir)?.load_config()?;
        trained.model.check()?;

        let mut run = self.config.clone();
        let t = &trained.run;
        if run.model_mean_type != t.model_mean_type {
            tracing::warn!(
                "Run was trained with model_mean_type {:?}, ignoring --model-mean-type {:?}",
                t.model_mean_type,
                run.model_mean_type
            );
        }
        if run.loss_type != t.loss_type {
            tracing::warn!(
                "Run was trained with loss_type {:?}, ignoring --loss-type {:?}",
                t.loss_type,
                run.loss_type
            );
        }
        run.model_mean_type = t.model_mean_type;
        run.model_var_type  = t.model_var_type;
        run.loss_type       = t.loss_type;

        Ok(EvalPlan { run_dir, run, trained })
    }

    pub fn execute(&self) -> Result<Scores> {
        match self.config.backend {
            BackendKind::Wgpu    => self.execute_on::<Wgpu>(),
            BackendKind::Ndarray => self.execute_on::<NdArray>(),
        }
    }

    fn execute_on<B: ComputeBackend>(&self) -> Result<Scores> {
        // ── Step 1: Run config ───────────────────────────────────────────────
        let plan  = self.plan()?;
        let cfg   = &plan.run;
        let world = World::<B>::from_gpus(&cfg.gpus)?;
        seed_everything::<B>(cfg.seed);
        let device = world.main_device();
        tracing::info!("Evaluating '{}' with the {:?} sampler", plan.run_dir.display(), cfg.sampler);

        // ── Step 2: Weights ──────────────────────────────────────────────────
        let ckpt = CheckpointManager::new(&plan.run_dir)?;
        let (model, model_ema, step) = ckpt.load::<B>(
            plan.trained.model.init(device),
            plan.trained.model.init(device),
            device,
        )?;
        let weights = if self.ema { Weights::Ema } else { Weights::Model };
        let model   = if self.ema { model_ema } else { model };

        // ── Step 3: Scorer ───────────────────────────────────────────────────
        let scorer = InceptionScorer::<B>::load(
            &cfg.inception_weights,
            &cfg.stats_file(),
            cfg.inception_batch_size,
            device,
        )
        .context("eval needs Inception weights and FID statistics (see the `stats` command)")?;

        // ── Step 4: Evaluate ─────────────────────────────────────────────────
        let sampler   = DiffusionSampler::new(cfg.diffusion(), cfg.sampler_settings());
        let evaluator = Evaluator {
            world:      &world,
            sampler:    &sampler,
            scorer:     &scorer,
            n_samples:  cfg.n_samples_eval,
            batch_size: cfg.batch_size,
            image_dims: [CIFAR_CHANNELS, CIFAR_SIDE, CIFAR_SIDE],
        };
        let eval_log = MetricsLogger::<EvalRow>::new(plan.output_dir())?;
        evaluator.evaluate_and_log(&model, weights, step, Some(&eval_log))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::{LossType, ModelMeanType};

    /// Write config.json of a run trained with `run`.
    fn save_run(run: RunConfig) -> TrainConfig {
        let trained = TrainConfig::new(run);
        CheckpointManager::new(trained.run.run_dir()).unwrap().save_config(&trained).unwrap();
        trained
    }

    #[test]
    fn test_trained_diffusion_types_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        save_run(RunConfig {
            result_dir:      dir.path().to_path_buf(),
            model_mean_type: ModelMeanType::XStart,
            loss_type:       LossType::L1,
            ..RunConfig::default()
        });

        // eval with default flags
        let cli  = RunConfig { result_dir: dir.path().to_path_buf(), ..RunConfig::default() };
        let plan = EvalUseCase::new(cli, false, None).plan().unwrap();

        assert_eq!(plan.run.model_mean_type, ModelMeanType::XStart);
        assert_eq!(plan.run.loss_type, LossType::L1);
        assert_eq!(plan.run.diffusion().mean_type, ModelMeanType::XStart);
    }

    #[test]
    fn test_eval_with_another_sampler_finds_training_run() {
        let dir = tempfile::tempdir().unwrap();
        let trained = save_run(RunConfig {
            result_dir: dir.path().to_path_buf(),
            sampler:    SamplerKind::Karras,
            ..RunConfig::default()
        });

        let cli = RunConfig {
            result_dir: dir.path().to_path_buf(),
            sampler:    SamplerKind::Ddim,
            ..RunConfig::default()
        };
        let plan = EvalUseCase::new(cli.clone(), true, Some(SamplerKind::Karras)).plan().unwrap();
        assert_eq!(plan.run_dir, trained.run.run_dir());
        assert_eq!(plan.run.sampler, SamplerKind::Ddim);
        assert_eq!(plan.run.sampler_settings().kind, SamplerKind::Ddim);
        assert_eq!(plan.output_dir(), trained.run.output_dir());

        // without --train-sampler the DDIM run directory is looked up
        let err = EvalUseCase::new(cli, true, None).plan().unwrap_err();
        assert!(err.to_string().contains("--train-sampler"));
    }
}
