// ─── Experiment Options ──────────────────────────────────────────────────────
// Each enum is spelled the same way on the command line and in config.json
// (snake_case), e.g. `--model-var-type learned_range`.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// What the network predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelMeanType {
    /// The noise that was added
    #[value(name = "eps")]
    Eps,
    /// The clean image
    #[value(name = "x_start")]
    XStart,
    /// The previous step x_{t-1}
    #[value(name = "x_prev")]
    XPrev,
}

/// How the reverse-process variance is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelVarType {
    #[value(name = "fixed_small")]
    FixedSmall,
    #[value(name = "fixed_large")]
    FixedLarge,
    #[value(name = "learned")]
    Learned,
    #[value(name = "learned_range")]
    LearnedRange,
}

impl ModelVarType {
    /// Learned variances double the network's output channels.
    pub fn is_learned(self) -> bool {
        matches!(self, ModelVarType::Learned | ModelVarType::LearnedRange)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelVarType::FixedSmall   => "fixed_small",
            ModelVarType::FixedLarge   => "fixed_large",
            ModelVarType::Learned      => "learned",
            ModelVarType::LearnedRange => "learned_range",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    #[value(name = "l2")]
    L2,
    #[value(name = "rescaled_l2")]
    RescaledL2,
    #[value(name = "l1")]
    L1,
    #[value(name = "rescaled_l1")]
    RescaledL1,
    #[value(name = "kl")]
    Kl,
    #[value(name = "rescaled_kl")]
    RescaledKl,
}

impl LossType {
    pub fn is_kl(self) -> bool {
        matches!(self, LossType::Kl | LossType::RescaledKl)
    }

    pub fn is_rescaled(self) -> bool {
        matches!(self, LossType::RescaledL2 | LossType::RescaledL1 | LossType::RescaledKl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BetaSchedule {
    #[value(name = "linear")]
    Linear,
    #[value(name = "cosine")]
    Cosine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    #[value(name = "ddpm")]
    Ddpm,
    #[value(name = "ddim")]
    Ddim,
    #[value(name = "karras")]
    Karras,
}

impl SamplerKind {
    /// Name used in the run directory, e.g. `KarrasSampler`.
    pub fn run_name(self) -> &'static str {
        match self {
            SamplerKind::Ddpm   => "DDPMSampler",
            SamplerKind::Ddim   => "DDIMSampler",
            SamplerKind::Karras => "KarrasSampler",
        }
    }
}

/// Integration rule used by the Karras sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KarrasMethod {
    #[value(name = "heun")]
    Heun,
    #[value(name = "dpm")]
    Dpm,
    #[value(name = "ancestral")]
    Ancestral,
}

/// Compute backend the workers run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[value(name = "wgpu")]
    Wgpu,
    #[value(name = "ndarray")]
    Ndarray,
}
