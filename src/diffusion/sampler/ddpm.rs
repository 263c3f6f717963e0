use burn::prelude::*;

use crate::diffusion::{sampler::randn, schedule::GaussianDiffusion, timestep_tensor, Denoiser};

/// Ancestral sampling through every training timestep:
///
///   x_{t-1} = mu_theta(x_t, t) + sigma_t z,   z ~ N(0, I), no noise at t = 0
#[derive(Debug, Clone)]
pub struct DdpmSampler {
    pub diffusion:     GaussianDiffusion,
    pub clip_denoised: bool,
}

impl DdpmSampler {
    pub fn new(diffusion: GaussianDiffusion, clip_denoised: bool) -> Self {
        Self { diffusion, clip_denoised }
    }

    pub fn sample<B: Backend, M: Denoiser<B>>(&self, model: &M, shape: [usize; 4], device: &B::Device) -> Tensor<B, 4> {
        let batch = shape[0];
        let mut x = randn::<B>(shape, device);

        for i in (0..self.diffusion.num_timesteps()).rev() {
            let t      = vec![i; batch];
            let output = model.denoise(x.clone(), timestep_tensor(&t, device));
            let out    = self.diffusion.p_mean_variance(output, x, &t, self.clip_denoised);

            x = if i > 0 {
                out.mean + (out.log_variance * 0.5).exp() * randn::<B>(shape, device)
            } else {
                out.mean
            };
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::sampler::test_support::{max_abs, PredictsZero};
    use crate::diffusion::schedule::get_betas;
    use crate::domain::options::{BetaSchedule, ModelMeanType, ModelVarType};
    use burn::backend::NdArray;

    #[test]
    fn test_zero_predictor_lands_on_zero() {
        let diffusion = GaussianDiffusion::new(
            get_betas(BetaSchedule::Linear, 20),
            ModelMeanType::XStart,
            ModelVarType::FixedSmall,
        );
        let sampler = DdpmSampler::new(diffusion, true);
        let x = sampler.sample::<NdArray, _>(&PredictsZero, [2, 3, 4, 4], &Default::default());
        assert_eq!(x.dims(), [2, 3, 4, 4]);
        // posterior mean at t = 0 is coef1 * x_0 since coef2[0] = 0
        assert!(max_abs(x) < 1e-5);
    }
}
