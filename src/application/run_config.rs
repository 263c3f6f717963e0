// ─── Run Configuration ───────────────────────────────────────────────────────
// Settings shared by `train`, `eval` and `stats`. Serialisable so the
// training run can write them next to its checkpoint.

use std::path::PathBuf;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::diffusion::{
    sampler::SamplerSettings,
    schedule::{get_betas, GaussianDiffusion},
};
use crate::domain::options::{
    BackendKind, BetaSchedule, KarrasMethod, LossType, ModelMeanType, ModelVarType, SamplerKind,
};
use crate::scoring::{stats::stats_file_name, IS_SPLITS};

/// Length of the forward process every sampler is derived from.
pub const NUM_TIMESTEPS: usize = 1000;
pub const BETA_SCHEDULE: BetaSchedule = BetaSchedule::Linear;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub result_dir:           PathBuf,
    pub gpus:                 Vec<usize>,
    pub backend:              BackendKind,
    pub batch_size:           usize,
    pub n_samples_eval:       usize,
    pub n_sampler_steps:      usize,
    pub model_mean_type:      ModelMeanType,
    pub loss_type:            LossType,
    pub model_var_type:       ModelVarType,
    pub sampler:              SamplerKind,
    pub karras_sampler:       KarrasMethod,
    pub ddim_eta:             f64,
    pub dataset_dir:          PathBuf,
    pub dataset_stats_path:   PathBuf,
    pub inception_weights:    PathBuf,
    pub inception_batch_size: usize,
    #[serde(default)]
    pub seed:                 u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            result_dir:           PathBuf::from("results"),
            gpus:                 vec![0],
            backend:              BackendKind::Wgpu,
            batch_size:           512,
            n_samples_eval:       1000,
            n_sampler_steps:      50,
            model_mean_type:      ModelMeanType::Eps,
            loss_type:            LossType::L2,
            model_var_type:       ModelVarType::FixedSmall,
            sampler:              SamplerKind::Karras,
            karras_sampler:       KarrasMethod::Heun,
            ddim_eta:             0.0,
            dataset_dir:          PathBuf::from("data/cifar10"),
            dataset_stats_path:   PathBuf::from("data/cifar10/stats"),
            inception_weights:    PathBuf::from("data/pt_inception-2015-12-05.safetensors"),
            inception_batch_size: 50,
            seed:                 0,
        }
    }
}

impl RunConfig {
    /// `<result_dir>/UnetBase_DDPMTrainer_<Sampler>_<var type>`
    pub fn run_dir(&self) -> PathBuf {
        self.run_dir_for(self.sampler)
    }

    /// Run directory of a model trained with `sampler`.
    pub fn run_dir_for(&self, sampler: SamplerKind) -> PathBuf {
        self.result_dir.join(format!(
            "UnetBase_DDPMTrainer_{}_{}",
            sampler.run_name(),
            self.model_var_type.as_str()
        ))
    }

    /// Reject settings no command can run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size >= 1, "batch size must be at least 1");
        ensure!(self.n_sampler_steps >= 1, "the sampler needs at least 1 step");
        ensure!(self.inception_batch_size >= 1, "Inception batch size must be at least 1");
        ensure!(
            self.n_samples_eval >= IS_SPLITS,
            "n_samples_eval must be at least {IS_SPLITS} (one per Inception Score split), got {}",
            self.n_samples_eval
        );
        ensure!(
            (0.0..=1.0).contains(&self.ddim_eta),
            "ddim_eta must lie in [0, 1], got {}",
            self.ddim_eta
        );
        Ok(())
    }

    pub fn sample_dir(&self) -> PathBuf {
        self.run_dir().join("samples")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.run_dir().join("outputs")
    }

    /// Reference statistics of the CIFAR-10 training split.
    pub fn stats_file(&self) -> PathBuf {
        self.dataset_stats_path.join(stats_file_name("cifar10", "train"))
    }

    pub fn diffusion(&self) -> GaussianDiffusion {
        GaussianDiffusion::new(
            get_betas(BETA_SCHEDULE, NUM_TIMESTEPS),
            self.model_mean_type,
            self.model_var_type,
        )
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            kind:          self.sampler,
            num_steps:     self.n_sampler_steps,
            karras_method: self.karras_sampler,
            ddim_eta:      self.ddim_eta,
            clip_denoised: true,
        }
    }

    /// Network output channels: mean only, or mean and variance.
    pub fn out_channels(&self, channels: usize) -> usize {
        if self.model_var_type.is_learned() { channels * 2 } else { channels }
    }
}
