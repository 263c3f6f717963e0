// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the training pipeline in order:
//
//   Step 1: Select devices and seed RNGs    (Layer 6 - infra)
//   Step 2: Prepare the run directory       (Layer 6 - infra)
//   Step 3: Load CIFAR-10 train split       (Layer 4 - data)
//   Step 4: Load Inception scorer if present (Layer 7 - scoring)
//   Step 5: Install Ctrl-C handler          (Layer 6 - infra)
//   Step 6: Run training loop               (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{ensure, Result};
use burn::backend::{NdArray, Wgpu};
use serde::{Deserialize, Serialize};

use crate::application::run_config::RunConfig;
use crate::data::{
    cifar::{Cifar10, Split, CIFAR_CHANNELS},
    dataset::ImageDataset,
};
use crate::domain::options::BackendKind;
use crate::infra::{
    checkpoint::CheckpointManager,
    interrupt::Interrupt,
    world::{seed_everything, ComputeBackend, World},
};
use crate::ml::{trainer::run_training, unet::UnetConfig};
use crate::scoring::InceptionScorer;

// ─── Training Configuration ──────────────────────────────────────────────────
// Written to <run_dir>/config.json; `eval` rebuilds the network from `model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(flatten)]
    pub run:               RunConfig,
    pub n_samples:         usize,
    pub n_steps:           usize,
    pub samples_per_steps: usize,
    pub lr:                f64,
    pub warmup:            usize,
    pub ema_decay:         f64,
    pub num_workers:       usize,
    pub log_every:         usize,
    pub resume:            bool,
    pub model:             UnetConfig,
}

impl TrainConfig {
    pub fn new(run: RunConfig) -> Self {
        let model = UnetConfig::new().with_out_channels(run.out_channels(CIFAR_CHANNELS));
        Self {
            run,
            n_samples:         256,
            n_steps:           20_000,
            samples_per_steps: 1000,
            lr:                2e-4,
            warmup:            500,
            ema_decay:         0.9999,
            num_workers:       2,
            log_every:         100,
            resume:            false,
            model,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;
        ensure!(self.n_samples >= 1, "n_samples must be at least 1");
        ensure!(self.n_steps >= 1, "n_steps must be at least 1");
        ensure!(
            (0.0..=1.0).contains(&self.ema_decay),
            "ema_decay must lie in [0, 1], got {}",
            self.ema_decay
        );
        Ok(())
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        match self.config.run.backend {
            BackendKind::Wgpu    => self.execute_on::<Wgpu>(),
            BackendKind::Ndarray => self.execute_on::<NdArray>(),
        }
    }

    fn execute_on<B: ComputeBackend>(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.model.check()?;

        // ── Step 1: Devices and seeds ────────────────────────────────────────
        let world = World::<B>::from_gpus(&cfg.run.gpus)?;
        seed_everything::<B>(cfg.run.seed);
        if world.is_distributed() {
            tracing::info!("Training on {} {} devices: {:?}", world.size(), B::NAME, world.devices());
        } else {
            tracing::info!("Training on {} device {:?}", B::NAME, world.main_device());
        }

        // ── Step 2: Run directory ────────────────────────────────────────────
        let ckpt = CheckpointManager::new(cfg.run.run_dir())?;
        std::fs::create_dir_all(cfg.run.sample_dir())?;
        std::fs::create_dir_all(cfg.run.output_dir())?;
        ckpt.save_config(cfg)?;
        tracing::info!("Run directory: '{}'", ckpt.dir().display());

        // ── Step 3: Training data ────────────────────────────────────────────
        let items = Cifar10::new(&cfg.run.dataset_dir).load(Split::Train)?;
        tracing::info!("Loaded {} training images", items.len());
        let dataset = ImageDataset::new(items);

        // ── Step 4: Scorer (optional while training) ─────────────────────────
        let scorer = load_scorer_if_available::<B>(&cfg.run, world.main_device())?;

        // ── Step 5: Ctrl-C ───────────────────────────────────────────────────
        let interrupt = Interrupt::install()?;

        // ── Step 6: Train ────────────────────────────────────────────────────
        run_training(cfg, &world, dataset, &ckpt, scorer.as_ref(), &interrupt)
    }
}

/// Missing weights or statistics only disable scoring; broken ones are errors.
fn load_scorer_if_available<B: ComputeBackend>(
    run:    &RunConfig,
    device: &B::Device,
) -> Result<Option<InceptionScorer<B>>> {
    let stats = run.stats_file();
    for path in [&run.inception_weights, &stats] {
        if !path.exists() {
            tracing::warn!("'{}' not found, IS/FID evaluation disabled for this run", path.display());
            return Ok(None);
        }
    }
    let scorer = InceptionScorer::load(&run.inception_weights, &stats, run.inception_batch_size, device)?;
    Ok(Some(scorer))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::ModelVarType;

    #[test]
    fn test_defaults_match_cli() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.n_steps, 20_000);
        assert_eq!(cfg.model.out_channels, 3);
        assert!((cfg.ema_decay - 0.9999).abs() < 1e-12);
    }

    #[test]
    fn test_learned_variance_config_builds_six_channel_model() {
        let run = RunConfig { model_var_type: ModelVarType::LearnedRange, ..RunConfig::default() };
        assert_eq!(TrainConfig::new(run).model.out_channels, 6);
    }

    #[test]
    fn test_config_json_is_flat_and_round_trips() {
        let cfg  = TrainConfig::default();
        let json = serde_json::to_value(&cfg).unwrap();
        // shared settings sit at the top level next to training ones
        assert_eq!(json["model_var_type"], "fixed_small");
        assert_eq!(json["n_steps"], 20_000);
        assert_eq!(json["model"]["dim"], 64);

        let back: TrainConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.run, cfg.run);
        assert_eq!(back.model.dim_mults, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_validate_checks_training_sizes() {
        assert!(TrainConfig::default().validate().is_ok());
        assert!(TrainConfig { n_samples: 0, ..TrainConfig::default() }.validate().is_err());
        assert!(TrainConfig { n_steps: 0, ..TrainConfig::default() }.validate().is_err());
        assert!(TrainConfig { ema_decay: 1.5, ..TrainConfig::default() }.validate().is_err());

        let run = RunConfig { batch_size: 0, ..RunConfig::default() };
        assert!(TrainConfig::new(run).validate().is_err());
    }

    #[test]
    fn test_scorer_disabled_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig {
            inception_weights:  dir.path().join("missing.safetensors"),
            dataset_stats_path: dir.path().to_path_buf(),
            ..RunConfig::default()
        };
        let device = Default::default();
        assert!(load_scorer_if_available::<NdArray>(&run, &device).unwrap().is_none());
    }
}
