// ============================================================
// Layer 5 — DDPM Training Objective
// ============================================================
// One call = one Monte-Carlo estimate of the per-sample loss:
//
//   t     ~ U{0, .., T-1}
//   noise ~ N(0, I)
//   x_t   = q_sample(x_0, t, noise)
//   out   = model(x_t, t)
//
//   l2 / l1     : |target - out|^p averaged over pixels, where target is
//                 noise (eps), x_0 (x_start) or mu~_t (x_prev)
//                 + variational-bound term when the variance is learned
//   kl          : variational-bound term alone, in bits per dimension
//
// The bound term for learned variances sees a detached mean so it only
// trains the variance channels.
//
// Reference: Nichol & Dhariwal (2021), "Improved DDPM", §3.1

use std::f64::consts::LN_2;

use burn::prelude::*;
use rand::Rng;

use crate::diffusion::{
    losses::{discretized_gaussian_log_likelihood, mean_flat, normal_kl},
    schedule::GaussianDiffusion,
    timestep_tensor, Denoiser,
};
use crate::domain::options::{LossType, ModelMeanType};

#[derive(Debug, Clone)]
pub struct DdpmTrainer {
    pub diffusion: GaussianDiffusion,
    pub loss_type: LossType,
}

impl DdpmTrainer {
    pub fn new(diffusion: GaussianDiffusion, loss_type: LossType) -> Self {
        Self { diffusion, loss_type }
    }

    /// Uniform timesteps for a batch.
    pub fn sample_timesteps<R: Rng>(&self, batch: usize, rng: &mut R) -> Vec<usize> {
        let n = self.diffusion.num_timesteps();
        (0..batch).map(|_| rng.gen_range(0..n)).collect()
    }

    /// Per-sample loss, shape [batch].
    pub fn training_losses<B: Backend, M: Denoiser<B>>(
        &self,
        model:   &M,
        x_start: Tensor<B, 4>,
        t:       &[usize],
        noise:   Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        let device = x_start.device();
        let d      = &self.diffusion;
        let x_t    = d.q_sample(x_start.clone(), t, noise.clone());
        let output = model.denoise(x_t.clone(), timestep_tensor(t, &device));

        if self.loss_type.is_kl() {
            let mut vb = self.vb_terms_bpd(output, x_start, x_t, t, false);
            if self.loss_type.is_rescaled() {
                vb = vb * d.num_timesteps() as f64;
            }
            return vb;
        }

        let (mean_out, var_out) = d.split_output(output);

        let vb = var_out.map(|var_out| {
            let frozen = Tensor::cat(vec![mean_out.clone().detach(), var_out], 1);
            let vb = self.vb_terms_bpd(frozen, x_start.clone(), x_t.clone(), t, false);
            if self.loss_type.is_rescaled() {
                // keeps the bound on the same scale as the mse term
                vb * (d.num_timesteps() as f64 / 1000.0)
            } else {
                vb
            }
        });

        let target = match d.mean_type {
            ModelMeanType::Eps    => noise,
            ModelMeanType::XStart => x_start,
            ModelMeanType::XPrev  => d.q_posterior_mean_variance(x_start, x_t, t).0,
        };

        let err = target - mean_out;
        let mse = match self.loss_type {
            LossType::L1 | LossType::RescaledL1 => mean_flat(err.abs()),
            _ => mean_flat(err.clone() * err),
        };

        match vb {
            Some(vb) => mse + vb,
            None     => mse,
        }
    }

    /// Variational-bound term in bits per dimension: decoder NLL at t = 0,
    /// KL(q(x_{t-1}|x_t,x_0) || p(x_{t-1}|x_t)) elsewhere.
    pub fn vb_terms_bpd<B: Backend>(
        &self,
        output:        Tensor<B, 4>,
        x_start:       Tensor<B, 4>,
        x_t:           Tensor<B, 4>,
        t:             &[usize],
        clip_denoised: bool,
    ) -> Tensor<B, 1> {
        let device = x_t.device();
        let d      = &self.diffusion;

        let (true_mean, _, true_log_var) = d.q_posterior_mean_variance(x_start.clone(), x_t.clone(), t);
        let out = d.p_mean_variance(output, x_t, t, clip_denoised);

        let kl = normal_kl(true_mean, true_log_var, out.mean.clone(), out.log_variance.clone());
        let kl = mean_flat(kl) / LN_2;

        let nll = discretized_gaussian_log_likelihood(x_start, out.mean, out.log_variance * 0.5).neg();
        let nll = mean_flat(nll) / LN_2;

        let at_zero: Vec<f32> = t.iter().map(|&t| if t == 0 { 1.0 } else { 0.0 }).collect();
        let at_zero = Tensor::<B, 1>::from_floats(at_zero.as_slice(), &device);
        nll * at_zero.clone() + kl * (at_zero.neg() + 1.0)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::schedule::get_betas;
    use crate::domain::options::{BetaSchedule, ModelVarType};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;
    use rand::{rngs::StdRng, SeedableRng};

    type TestBackend = NdArray;

    /// Predicts zeros with `factor` times the input channels.
    struct Zeros {
        factor: usize,
    }

    impl<B: Backend> Denoiser<B> for Zeros {
        fn denoise(&self, x: Tensor<B, 4>, _t: Tensor<B, 1>) -> Tensor<B, 4> {
            let [b, c, h, w] = x.dims();
            Tensor::zeros([b, c * self.factor, h, w], &x.device())
        }
    }

    fn trainer(mean: ModelMeanType, var: ModelVarType, loss: LossType) -> DdpmTrainer {
        let diffusion = GaussianDiffusion::new(get_betas(BetaSchedule::Linear, 100), mean, var);
        DdpmTrainer::new(diffusion, loss)
    }

    #[test]
    fn test_eps_l2_with_zero_prediction_is_noise_power() {
        let trainer = trainer(ModelMeanType::Eps, ModelVarType::FixedSmall, LossType::L2);
        let device  = Default::default();
        let x0      = Tensor::<TestBackend, 4>::random([4, 3, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let noise   = Tensor::<TestBackend, 4>::random([4, 3, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let t       = [0, 10, 50, 99];

        let loss   = trainer.training_losses(&Zeros { factor: 1 }, x0, &t, noise.clone());
        let expect = mean_flat(noise.clone() * noise);
        let diff   = (loss - expect).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn test_learned_variance_adds_bound_term() {
        let trainer = trainer(ModelMeanType::Eps, ModelVarType::LearnedRange, LossType::RescaledL2);
        let device  = Default::default();
        let x0      = Tensor::<TestBackend, 4>::random([3, 3, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let noise   = Tensor::<TestBackend, 4>::random([3, 3, 4, 4], Distribution::Normal(0.0, 1.0), &device);

        let t   = [0, 5, 70];

        let all = trainer.training_losses(&Zeros { factor: 2 }, x0.clone(), &t, noise.clone());
        let all = all.into_data().to_vec::<f32>().unwrap();

        // zero prediction: mse is the noise power, the bound sees a zero output
        let mse = mean_flat(noise.clone() * noise.clone()).into_data().to_vec::<f32>().unwrap();
        let x_t = trainer.diffusion.q_sample(x0.clone(), &t, noise);
        let out = Tensor::cat(vec![x_t.zeros_like(), x_t.zeros_like()], 1);
        let vb  = trainer.vb_terms_bpd(out, x0, x_t, &t, false) * 0.1;
        let vb  = vb.into_data().to_vec::<f32>().unwrap();

        assert_eq!(all.len(), 3);
        for i in 0..3 {
            assert!(vb[i].is_finite() && vb[i] >= -1e-4);
            assert!((all[i] - mse[i] - vb[i]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_kl_loss_is_per_sample_and_finite() {
        let trainer = trainer(ModelMeanType::XStart, ModelVarType::FixedLarge, LossType::Kl);
        let device  = Default::default();
        let x0      = Tensor::<TestBackend, 4>::random([2, 3, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let noise   = Tensor::<TestBackend, 4>::random([2, 3, 4, 4], Distribution::Normal(0.0, 1.0), &device);

        let loss = trainer.training_losses(&Zeros { factor: 1 }, x0, &[0, 42], noise);
        assert_eq!(loss.dims(), [2]);
        let values = loss.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn test_timesteps_in_range() {
        let trainer = trainer(ModelMeanType::Eps, ModelVarType::FixedSmall, LossType::L2);
        let mut rng = StdRng::seed_from_u64(0);
        let t = trainer.sample_timesteps(1000, &mut rng);
        assert!(t.iter().all(|&t| t < 100));
        assert!(t.contains(&0) && t.contains(&99));
    }
}
