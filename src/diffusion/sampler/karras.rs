// ============================================================
// Karras et al. (2022) sampler for a discrete VP model
// ============================================================
// The trained network lives on T discrete timesteps. In sigma space
// the same process is  x = x_0 + sigma * eps  with
//
//   sigma_t = sqrt((1 - abar_t) / abar_t)
//
// so a VP input is x / sqrt(sigma^2 + 1), and any sigma maps back to a
// fractional timestep by interpolating log sigma between neighbours.
//
//   sigmas: Karras rho-schedule from sigma_max down to sigma_min, then 0
//
//   heun      — 2nd order Heun, Euler on the final step
//   dpm       — DPM-Solver-2, midpoint in log sigma
//   ancestral — Euler ancestral, eta = 1
//
// Reference: Karras et al. (2022) Algorithm 2; k-diffusion sampling.py

use burn::prelude::*;

use crate::diffusion::{sampler::randn, schedule::GaussianDiffusion, Denoiser};
use crate::domain::options::{KarrasMethod, ModelMeanType};

const RHO: f64 = 7.0;

#[derive(Debug, Clone)]
pub struct KarrasSampler {
    pub diffusion:     GaussianDiffusion,
    pub method:        KarrasMethod,
    pub clip_denoised: bool,

    /// Sampling schedule, descending, trailing 0
    pub sigmas: Vec<f64>,

    /// ln(sigma_t) of every training timestep, ascending in t
    log_sigmas: Vec<f64>,
}

impl KarrasSampler {
    pub fn new(diffusion: GaussianDiffusion, num_steps: usize, method: KarrasMethod, clip_denoised: bool) -> Self {
        let train_sigmas: Vec<f64> = diffusion
            .alphas_cumprod
            .iter()
            .map(|a| ((1.0 - a) / a).sqrt())
            .collect();
        let sigma_min = train_sigmas.first().copied().unwrap_or(0.0);
        let sigma_max = train_sigmas.last().copied().unwrap_or(0.0);
        let sigmas     = karras_sigmas(num_steps, sigma_min, sigma_max, RHO);
        let log_sigmas = train_sigmas.iter().map(|s| s.ln()).collect();
        Self { diffusion, method, clip_denoised, sigmas, log_sigmas }
    }

    pub fn num_evaluations(&self) -> usize {
        let steps = self.sigmas.len().saturating_sub(1);
        match self.method {
            KarrasMethod::Heun | KarrasMethod::Dpm => (2 * steps).saturating_sub(1),
            KarrasMethod::Ancestral => steps,
        }
    }

    /// Fractional training timestep whose sigma equals `sigma`.
    pub fn sigma_to_t(&self, sigma: f64) -> f64 {
        let ls   = &self.log_sigmas;
        let last = ls.len().saturating_sub(1);
        let log_sigma = sigma.ln();
        if last == 0 || log_sigma <= ls[0] {
            return 0.0;
        }
        if log_sigma >= ls[last] {
            return last as f64;
        }
        let low  = ls.partition_point(|&l| l <= log_sigma).saturating_sub(1).min(last - 1);
        let high = low + 1;
        let w    = ((ls[low] - log_sigma) / (ls[low] - ls[high])).clamp(0.0, 1.0);
        (1.0 - w) * low as f64 + w * high as f64
    }

    /// D(x; sigma): the model's estimate of x_0 from a sigma-space input.
    fn denoised<B: Backend, M: Denoiser<B>>(&self, model: &M, x: Tensor<B, 4>, sigma: f64) -> Tensor<B, 4> {
        let device = x.device();
        let batch  = x.dims()[0];
        let c_in   = 1.0 / (sigma * sigma + 1.0).sqrt();
        let t      = self.sigma_to_t(sigma);

        let timesteps = Tensor::<B, 1>::ones([batch], &device) * t;
        let x_in      = x.clone() * c_in;
        let (out, _)  = self.diffusion.split_output(model.denoise(x_in.clone(), timesteps));

        let denoised = match self.diffusion.mean_type {
            ModelMeanType::Eps    => x - out * sigma,
            ModelMeanType::XStart => out,
            ModelMeanType::XPrev  => {
                let step = vec![t.round() as usize; batch];
                self.diffusion.predict_xstart_from_xprev(x_in, &step, out)
            }
        };
        if self.clip_denoised { denoised.clamp(-1.0, 1.0) } else { denoised }
    }

    pub fn sample<B: Backend, M: Denoiser<B>>(&self, model: &M, shape: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        let sigma_max = self.sigmas.first().copied().unwrap_or(1.0);
        let mut x = randn::<B>(shape, device) * sigma_max;

        for pair in self.sigmas.windows(2) {
            let (sigma, sigma_next) = (pair[0], pair[1]);
            let denoised = self.denoised(model, x.clone(), sigma);
            let d = (x.clone() - denoised) / sigma;

            x = match self.method {
                KarrasMethod::Heun => {
                    let dt = sigma_next - sigma;
                    if sigma_next == 0.0 {
                        x + d * dt
                    } else {
                        let x_2 = x.clone() + d.clone() * dt;
                        let d_2 = (x_2.clone() - self.denoised(model, x_2, sigma_next)) / sigma_next;
                        x + (d + d_2) * (dt / 2.0)
                    }
                }
                KarrasMethod::Dpm => {
                    if sigma_next == 0.0 {
                        x + d * (sigma_next - sigma)
                    } else {
                        let sigma_mid = ((sigma.ln() + sigma_next.ln()) / 2.0).exp();
                        let x_2 = x.clone() + d * (sigma_mid - sigma);
                        let d_2 = (x_2.clone() - self.denoised(model, x_2, sigma_mid)) / sigma_mid;
                        x + d_2 * (sigma_next - sigma)
                    }
                }
                KarrasMethod::Ancestral => {
                    let (sigma_down, sigma_up) = ancestral_step(sigma, sigma_next);
                    let x = x + d * (sigma_down - sigma);
                    if sigma_next > 0.0 {
                        x + randn::<B>(shape, device) * sigma_up
                    } else {
                        x
                    }
                }
            };
        }
        x
    }
}

/// Karras et al. noise levels: `n` values from `sigma_max` to `sigma_min`
/// spaced uniformly in `sigma^(1/rho)`, followed by 0.
pub fn karras_sigmas(n: usize, sigma_min: f64, sigma_max: f64, rho: f64) -> Vec<f64> {
    let min_inv = sigma_min.powf(1.0 / rho);
    let max_inv = sigma_max.powf(1.0 / rho);
    let mut sigmas: Vec<f64> = (0..n)
        .map(|i| {
            let ramp = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
            (max_inv + ramp * (min_inv - max_inv)).powf(rho)
        })
        .collect();
    sigmas.push(0.0);
    sigmas
}

/// Split a step from `sigma_from` to `sigma_to` into a deterministic part
/// down to `sigma_down` and fresh noise of scale `sigma_up` (eta = 1).
pub fn ancestral_step(sigma_from: f64, sigma_to: f64) -> (f64, f64) {
    let up = (sigma_to * sigma_to * (sigma_from * sigma_from - sigma_to * sigma_to)
        / (sigma_from * sigma_from))
        .max(0.0)
        .sqrt()
        .min(sigma_to);
    let down = (sigma_to * sigma_to - up * up).max(0.0).sqrt();
    (down, up)
}
