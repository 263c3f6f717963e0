use burn::prelude::*;

use crate::diffusion::{sampler::randn, schedule::GaussianDiffusion, timestep_tensor, Denoiser};

/// DDIM on a uniformly spaced subset of the training timesteps.
///
/// With `t' < t` the next visited step,
///
///   x_0^   = predicted clean image
///   eps^   = (x_t / sqrt(abar_t) - x_0^) / sqrt(1 / abar_t - 1)
///   sigma  = eta * sqrt((1 - abar_t') / (1 - abar_t)) * sqrt(1 - abar_t / abar_t')
///   x_t'   = sqrt(abar_t') x_0^ + sqrt(1 - abar_t' - sigma^2) eps^ + sigma z
///
/// `eta = 0` makes sampling deterministic given the initial noise.
#[derive(Debug, Clone)]
pub struct DdimSampler {
    pub diffusion:     GaussianDiffusion,
    pub timesteps:     Vec<usize>,
    pub eta:           f64,
    pub clip_denoised: bool,
}

impl DdimSampler {
    pub fn new(diffusion: GaussianDiffusion, num_steps: usize, eta: f64, clip_denoised: bool) -> Self {
        let timesteps = space_timesteps(diffusion.num_timesteps(), num_steps);
        Self { diffusion, timesteps, eta, clip_denoised }
    }

    pub fn sample<B: Backend, M: Denoiser<B>>(&self, model: &M, shape: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        self.sample_from(model, randn::<B>(shape, device))
    }

    /// Run the reverse process starting from the given x_T.
    pub fn sample_from<B: Backend, M: Denoiser<B>>(&self, model: &M, noise: Tensor<B, 4>) -> Tensor<B, 4> {
        let d      = &self.diffusion;
        let device = noise.device();
        let shape  = noise.dims();
        let batch  = shape[0];
        let mut x  = noise;

        for (k, &step) in self.timesteps.iter().enumerate().rev() {
            let t          = vec![step; batch];
            let abar       = d.alphas_cumprod[step];
            let abar_prev  = if k == 0 { 1.0 } else { d.alphas_cumprod[self.timesteps[k - 1]] };

            let output = model.denoise(x.clone(), timestep_tensor(&t, &device));
            let out    = d.p_mean_variance(output, x.clone(), &t, self.clip_denoised);
            let eps    = d.predict_eps_from_xstart(x, &t, out.pred_xstart.clone());

            let sigma = self.eta
                * ((1.0 - abar_prev) / (1.0 - abar)).sqrt()
                * (1.0 - abar / abar_prev).sqrt();
            let dir = (1.0 - abar_prev - sigma * sigma).max(0.0).sqrt();

            x = out.pred_xstart * abar_prev.sqrt() + eps * dir;
            if k > 0 && sigma > 0.0 {
                x = x + randn::<B>(shape, &device) * sigma;
            }
        }
        x
    }
}

/// `num_steps` evenly spaced timesteps `0, T/n, 2T/n, ..` (ascending).
pub fn space_timesteps(num_timesteps: usize, num_steps: usize) -> Vec<usize> {
    let n = num_steps.clamp(1, num_timesteps);
    (0..n).map(|i| i * num_timesteps / n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::sampler::test_support::{max_abs, PredictsZero};
    use crate::diffusion::schedule::get_betas;
    use crate::domain::options::{BetaSchedule, ModelMeanType, ModelVarType};
    use burn::backend::NdArray;

    fn diffusion(mean: ModelMeanType) -> GaussianDiffusion {
        GaussianDiffusion::new(get_betas(BetaSchedule::Linear, 100), mean, ModelVarType::FixedSmall)
    }

    #[test]
    fn test_space_timesteps() {
        assert_eq!(space_timesteps(1000, 4), vec![0, 250, 500, 750]);
        assert_eq!(space_timesteps(10, 50).len(), 10);
        assert_eq!(space_timesteps(10, 0), vec![0]);
    }

    #[test]
    fn test_zero_predictor_lands_on_zero() {
        let sampler = DdimSampler::new(diffusion(ModelMeanType::XStart), 10, 1.0, true);
        let x = sampler.sample::<NdArray, _>(&PredictsZero, [2, 3, 4, 4], &Default::default());
        assert!(max_abs(x) < 1e-5);
    }

    /// eps-model that reports the input itself as the noise.
    struct Identity;

    impl<B: Backend> Denoiser<B> for Identity {
        fn denoise(&self, x: Tensor<B, 4>, _t: Tensor<B, 1>) -> Tensor<B, 4> {
            x
        }
    }

    #[test]
    fn test_eta_zero_is_deterministic_given_noise() {
        let sampler = DdimSampler::new(diffusion(ModelMeanType::Eps), 5, 0.0, false);
        let noise   = crate::diffusion::sampler::randn::<NdArray>([1, 1, 2, 2], &Default::default());

        let a = sampler.sample_from(&Identity, noise.clone());
        let b = sampler.sample_from(&Identity, noise);
        assert!(max_abs(a - b) < 1e-6);
    }
}
