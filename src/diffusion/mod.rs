// ============================================================
// Layer 5 — Diffusion Core
// ============================================================
// The math of denoising diffusion, independent of any network:
//
//   schedule.rs — beta schedules and the Gaussian process tables
//   losses.rs   — KL / likelihood terms of the variational bound
//   trainer.rs  — per-sample training losses (DDPM objective)
//   sampler/    — DDPM, DDIM and Karras reverse processes
//
// Networks plug in through the Denoiser trait below, so samplers
// and losses can be tested with tiny closed-form models.
//
// Reference: Ho et al. (2020), Song et al. (2021), Karras et al. (2022)

use burn::prelude::*;

pub mod losses;
pub mod sampler;
pub mod schedule;
pub mod trainer;

/// A network that maps a noisy batch and its (possibly fractional)
/// timesteps to a prediction of shape [batch, out_channels, h, w].
pub trait Denoiser<B: Backend> {
    fn denoise(&self, x: Tensor<B, 4>, timesteps: Tensor<B, 1>) -> Tensor<B, 4>;
}

/// Timesteps of a batch as the float tensor a Denoiser receives.
pub fn timestep_tensor<B: Backend>(t: &[usize], device: &B::Device) -> Tensor<B, 1> {
    let values: Vec<f32> = t.iter().map(|&t| t as f32).collect();
    Tensor::from_floats(values.as_slice(), device)
}
