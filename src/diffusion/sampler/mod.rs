//! Reverse processes that turn Gaussian noise into images in [-1, 1].

use burn::prelude::*;
use burn::tensor::Distribution;

use crate::diffusion::{schedule::GaussianDiffusion, Denoiser};
use crate::domain::options::{KarrasMethod, SamplerKind};

pub mod ddim;
pub mod ddpm;
pub mod karras;

pub use ddim::DdimSampler;
pub use ddpm::DdpmSampler;
pub use karras::KarrasSampler;

/// Sampler settings as chosen on the command line.
#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    pub kind:          SamplerKind,
    pub num_steps:     usize,
    pub karras_method: KarrasMethod,
    pub ddim_eta:      f64,
    pub clip_denoised: bool,
}

/// One of the supported samplers, all sharing the training schedule.
#[derive(Debug, Clone)]
pub enum DiffusionSampler {
    Ddpm(DdpmSampler),
    Ddim(DdimSampler),
    Karras(KarrasSampler),
}

impl DiffusionSampler {
    pub fn new(diffusion: GaussianDiffusion, settings: SamplerSettings) -> Self {
        match settings.kind {
            SamplerKind::Ddpm => DiffusionSampler::Ddpm(DdpmSampler::new(diffusion, settings.clip_denoised)),
            SamplerKind::Ddim => DiffusionSampler::Ddim(DdimSampler::new(
                diffusion,
                settings.num_steps,
                settings.ddim_eta,
                settings.clip_denoised,
            )),
            SamplerKind::Karras => DiffusionSampler::Karras(KarrasSampler::new(
                diffusion,
                settings.num_steps,
                settings.karras_method,
                settings.clip_denoised,
            )),
        }
    }

    /// Generate a batch of `shape = [n, c, h, w]` images.
    pub fn sample<B: Backend, M: Denoiser<B>>(&self, model: &M, shape: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        match self {
            DiffusionSampler::Ddpm(s)   => s.sample(model, shape, device),
            DiffusionSampler::Ddim(s)   => s.sample(model, shape, device),
            DiffusionSampler::Karras(s) => s.sample(model, shape, device),
        }
    }

    /// Number of network evaluations one `sample` call costs.
    pub fn num_evaluations(&self) -> usize {
        match self {
            DiffusionSampler::Ddpm(s)   => s.diffusion.num_timesteps(),
            DiffusionSampler::Ddim(s)   => s.timesteps.len(),
            DiffusionSampler::Karras(s) => s.num_evaluations(),
        }
    }
}

pub(crate) fn randn<B: Backend>(shape: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
    Tensor::random(shape, Distribution::Normal(0.0, 1.0), device)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Always predicts x_0 = 0 (mean type x_start).
    pub struct PredictsZero;

    impl<B: Backend> Denoiser<B> for PredictsZero {
        fn denoise(&self, x: Tensor<B, 4>, _t: Tensor<B, 1>) -> Tensor<B, 4> {
            x.zeros_like()
        }
    }

    pub fn max_abs<B: Backend>(x: Tensor<B, 4>) -> f32 {
        x.abs().max().into_data().to_vec::<f32>().unwrap()[0]
    }
}
