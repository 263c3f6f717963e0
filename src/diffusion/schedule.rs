// ============================================================
// Layer 5 — Noise Schedule and Gaussian Diffusion
// ============================================================
// Forward process:   q(x_t | x_0) = N(sqrt(abar_t) x_0, (1 - abar_t) I)
// Posterior:         q(x_{t-1} | x_t, x_0) = N(mu~_t, beta~_t I)
//
//   abar_t   = prod_{s<=t} (1 - beta_s)
//   beta~_t  = beta_t (1 - abar_{t-1}) / (1 - abar_t)
//   mu~_t    = coef1_t x_0 + coef2_t x_t
//
// Every coefficient table is computed once on the host in f64 and
// gathered per batch item into a [batch, 1, 1, 1] tensor, so the
// same tables serve every device.
//
// Reference: Ho et al. (2020) DDPM, Nichol & Dhariwal (2021) iDDPM

use std::f64::consts::PI;

use burn::prelude::*;

use crate::domain::options::{BetaSchedule, ModelMeanType, ModelVarType};

/// Beta schedule over `num_timesteps` steps.
pub fn get_betas(schedule: BetaSchedule, num_timesteps: usize) -> Vec<f64> {
    match schedule {
        BetaSchedule::Linear => {
            // scaled so any T gives the same overall noise as T = 1000
            let scale = 1000.0 / num_timesteps as f64;
            let start = scale * 1e-4;
            let end   = scale * 0.02;
            if num_timesteps == 1 {
                return vec![start];
            }
            (0..num_timesteps)
                .map(|i| start + (end - start) * i as f64 / (num_timesteps - 1) as f64)
                .collect()
        }
        BetaSchedule::Cosine => {
            let alpha_bar = |t: f64| ((t + 0.008) / 1.008 * PI / 2.0).cos().powi(2);
            (0..num_timesteps)
                .map(|i| {
                    let t1 = i as f64 / num_timesteps as f64;
                    let t2 = (i + 1) as f64 / num_timesteps as f64;
                    (1.0 - alpha_bar(t2) / alpha_bar(t1)).min(0.999)
                })
                .collect()
        }
    }
}

/// Mean / variance of p(x_{t-1} | x_t) plus the x_0 it implies.
pub struct MeanVariance<B: Backend> {
    pub mean:         Tensor<B, 4>,
    pub variance:     Tensor<B, 4>,
    pub log_variance: Tensor<B, 4>,
    pub pred_xstart:  Tensor<B, 4>,
}

/// Host-side coefficient tables of a discrete Gaussian diffusion process.
#[derive(Debug, Clone)]
pub struct GaussianDiffusion {
    pub mean_type: ModelMeanType,
    pub var_type:  ModelVarType,

    pub betas:                           Vec<f64>,
    pub alphas_cumprod:                  Vec<f64>,
    pub alphas_cumprod_prev:             Vec<f64>,
    pub sqrt_alphas_cumprod:             Vec<f64>,
    pub sqrt_one_minus_alphas_cumprod:   Vec<f64>,
    pub sqrt_recip_alphas_cumprod:       Vec<f64>,
    pub sqrt_recipm1_alphas_cumprod:     Vec<f64>,
    pub posterior_variance:              Vec<f64>,
    pub posterior_log_variance_clipped:  Vec<f64>,
    pub posterior_mean_coef1:            Vec<f64>,
    pub posterior_mean_coef2:            Vec<f64>,
}

impl GaussianDiffusion {
    pub fn new(betas: Vec<f64>, mean_type: ModelMeanType, var_type: ModelVarType) -> Self {
        let n = betas.len();

        let mut alphas_cumprod = Vec::with_capacity(n);
        let mut acc = 1.0;
        for &beta in &betas {
            acc *= 1.0 - beta;
            alphas_cumprod.push(acc);
        }

        let alphas_cumprod_prev: Vec<f64> = std::iter::once(1.0)
            .chain(alphas_cumprod.iter().copied().take(n.saturating_sub(1)))
            .collect();

        let posterior_variance: Vec<f64> = (0..n)
            .map(|i| betas[i] * (1.0 - alphas_cumprod_prev[i]) / (1.0 - alphas_cumprod[i]))
            .collect();

        // posterior_variance[0] is 0, so its log borrows index 1
        let posterior_log_variance_clipped: Vec<f64> = (0..n)
            .map(|i| {
                let v = if i == 0 && n > 1 { posterior_variance[1] } else { posterior_variance[i] };
                v.ln()
            })
            .collect();

        let posterior_mean_coef1 = (0..n)
            .map(|i| betas[i] * alphas_cumprod_prev[i].sqrt() / (1.0 - alphas_cumprod[i]))
            .collect();
        let posterior_mean_coef2 = (0..n)
            .map(|i| (1.0 - alphas_cumprod_prev[i]) * (1.0 - betas[i]).sqrt() / (1.0 - alphas_cumprod[i]))
            .collect();

        Self {
            mean_type,
            var_type,
            sqrt_alphas_cumprod:           alphas_cumprod.iter().map(|a| a.sqrt()).collect(),
            sqrt_one_minus_alphas_cumprod: alphas_cumprod.iter().map(|a| (1.0 - a).sqrt()).collect(),
            sqrt_recip_alphas_cumprod:     alphas_cumprod.iter().map(|a| (1.0 / a).sqrt()).collect(),
            sqrt_recipm1_alphas_cumprod:   alphas_cumprod.iter().map(|a| (1.0 / a - 1.0).sqrt()).collect(),
            betas,
            alphas_cumprod,
            alphas_cumprod_prev,
            posterior_variance,
            posterior_log_variance_clipped,
            posterior_mean_coef1,
            posterior_mean_coef2,
        }
    }

    pub fn num_timesteps(&self) -> usize {
        self.betas.len()
    }

    // ─── Forward process ────────────────────────────────────────────────────

    /// Draw x_t ~ q(x_t | x_0) using the given noise.
    pub fn q_sample<B: Backend>(&self, x_start: Tensor<B, 4>, t: &[usize], noise: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x_start.device();
        x_start * extract(&self.sqrt_alphas_cumprod, t, &device)
            + noise * extract(&self.sqrt_one_minus_alphas_cumprod, t, &device)
    }

    /// Mean, variance and clipped log variance of q(x_{t-1} | x_t, x_0).
    pub fn q_posterior_mean_variance<B: Backend>(
        &self,
        x_start: Tensor<B, 4>,
        x_t:     Tensor<B, 4>,
        t:       &[usize],
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let device = x_t.device();
        let mean = x_start * extract(&self.posterior_mean_coef1, t, &device)
            + x_t * extract(&self.posterior_mean_coef2, t, &device);
        let var     = extract(&self.posterior_variance, t, &device);
        let log_var = extract(&self.posterior_log_variance_clipped, t, &device);
        (mean, var, log_var)
    }

    // ─── Parameterisation conversions ───────────────────────────────────────

    pub fn predict_xstart_from_eps<B: Backend>(&self, x_t: Tensor<B, 4>, t: &[usize], eps: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x_t.device();
        x_t * extract(&self.sqrt_recip_alphas_cumprod, t, &device)
            - eps * extract(&self.sqrt_recipm1_alphas_cumprod, t, &device)
    }

    pub fn predict_eps_from_xstart<B: Backend>(&self, x_t: Tensor<B, 4>, t: &[usize], pred_xstart: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x_t.device();
        (x_t * extract(&self.sqrt_recip_alphas_cumprod, t, &device) - pred_xstart)
            / extract(&self.sqrt_recipm1_alphas_cumprod, t, &device)
    }

    /// Invert the posterior mean: x_0 = (x_prev - coef2 x_t) / coef1.
    pub fn predict_xstart_from_xprev<B: Backend>(&self, x_t: Tensor<B, 4>, t: &[usize], xprev: Tensor<B, 4>) -> Tensor<B, 4> {
        let device = x_t.device();
        let recip_coef1: Vec<f64> = self.posterior_mean_coef1.iter().map(|c| 1.0 / c).collect();
        let ratio: Vec<f64> = self.posterior_mean_coef2.iter()
            .zip(&self.posterior_mean_coef1)
            .map(|(c2, c1)| c2 / c1)
            .collect();
        xprev * extract(&recip_coef1, t, &device) - x_t * extract(&ratio, t, &device)
    }

    /// Split a raw network output into (mean part, variance part).
    /// The variance part is `None` unless the variance is learned.
    pub fn split_output<B: Backend>(&self, output: Tensor<B, 4>) -> (Tensor<B, 4>, Option<Tensor<B, 4>>) {
        if !self.var_type.is_learned() {
            return (output, None);
        }
        let [b, c2, h, w] = output.dims();
        let c = c2 / 2;
        let mean_part = output.clone().slice([0..b, 0..c, 0..h, 0..w]);
        let var_part  = output.slice([0..b, c..c2, 0..h, 0..w]);
        (mean_part, Some(var_part))
    }

    /// Turn a network output into the reverse-step distribution.
    pub fn p_mean_variance<B: Backend>(
        &self,
        output:        Tensor<B, 4>,
        x_t:           Tensor<B, 4>,
        t:             &[usize],
        clip_denoised: bool,
    ) -> MeanVariance<B> {
        let device = x_t.device();
        let (mean_out, var_out) = self.split_output(output);
        let shape = x_t.dims();

        let (variance, log_variance) = match (self.var_type, var_out) {
            (ModelVarType::Learned, Some(v)) => (v.clone().exp(), v),
            (ModelVarType::LearnedRange, Some(v)) => {
                let min_log = extract::<B>(&self.posterior_log_variance_clipped, t, &device);
                let log_betas: Vec<f64> = self.betas.iter().map(|b| b.ln()).collect();
                let max_log = extract::<B>(&log_betas, t, &device);
                // v in [-1, 1] picks a point between the two bounds
                let frac = (v + 1.0) / 2.0;
                let log_var = frac.clone() * max_log + (frac.neg() + 1.0) * min_log;
                (log_var.clone().exp(), log_var)
            }
            (ModelVarType::FixedLarge, _) => {
                let mut large = self.betas.clone();
                if large.len() > 1 {
                    large[0] = self.posterior_variance[1];
                }
                let log_large: Vec<f64> = large.iter().map(|v| v.ln()).collect();
                (
                    extract::<B>(&large, t, &device).expand(shape),
                    extract::<B>(&log_large, t, &device).expand(shape),
                )
            }
            _ => (
                extract::<B>(&self.posterior_variance, t, &device).expand(shape),
                extract::<B>(&self.posterior_log_variance_clipped, t, &device).expand(shape),
            ),
        };

        let clip = |x: Tensor<B, 4>| if clip_denoised { x.clamp(-1.0, 1.0) } else { x };

        let (pred_xstart, mean) = match self.mean_type {
            ModelMeanType::XPrev => {
                let pred_xstart = clip(self.predict_xstart_from_xprev(x_t, t, mean_out.clone()));
                (pred_xstart, mean_out)
            }
            ModelMeanType::XStart => {
                let pred_xstart = clip(mean_out);
                let (mean, _, _) = self.q_posterior_mean_variance(pred_xstart.clone(), x_t, t);
                (pred_xstart, mean)
            }
            ModelMeanType::Eps => {
                let pred_xstart = clip(self.predict_xstart_from_eps(x_t.clone(), t, mean_out));
                let (mean, _, _) = self.q_posterior_mean_variance(pred_xstart.clone(), x_t, t);
                (pred_xstart, mean)
            }
        };

        MeanVariance { mean, variance, log_variance, pred_xstart }
    }
}

/// Gather `values[t[i]]` for every batch item into a [batch, 1, 1, 1] tensor.
pub fn extract<B: Backend>(values: &[f64], t: &[usize], device: &B::Device) -> Tensor<B, 4> {
    let picked: Vec<f32> = t.iter().map(|&i| values[i] as f32).collect();
    Tensor::<B, 1>::from_floats(picked.as_slice(), device).reshape([t.len(), 1, 1, 1])
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn linear(t: usize) -> GaussianDiffusion {
        GaussianDiffusion::new(get_betas(BetaSchedule::Linear, t), ModelMeanType::Eps, ModelVarType::FixedSmall)
    }

    #[test]
    fn test_linear_betas_endpoints() {
        let betas = get_betas(BetaSchedule::Linear, 1000);
        assert_eq!(betas.len(), 1000);
        assert!((betas[0] - 1e-4).abs() < 1e-12);
        assert!((betas[999] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_betas_are_capped() {
        let betas = get_betas(BetaSchedule::Cosine, 1000);
        assert!(betas.iter().all(|&b| b > 0.0 && b <= 0.999));
        assert!((betas[999] - 0.999).abs() < 1e-9);
    }

    #[test]
    fn test_alphas_cumprod_decreasing() {
        let d = linear(1000);
        assert!(d.alphas_cumprod.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(d.alphas_cumprod_prev[0], 1.0);
        assert_eq!(d.alphas_cumprod_prev[1], d.alphas_cumprod[0]);
        assert_eq!(d.posterior_variance[0], 0.0);
        assert_eq!(d.posterior_log_variance_clipped[0], d.posterior_variance[1].ln());
    }

    #[test]
    fn test_xstart_recovered_from_true_noise() {
        let d      = linear(100);
        let device = Default::default();
        let x0     = Tensor::<TestBackend, 4>::random([3, 2, 4, 4], Distribution::Uniform(-1.0, 1.0), &device);
        let noise  = Tensor::<TestBackend, 4>::random([3, 2, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let t      = [0, 50, 99];

        let x_t  = d.q_sample(x0.clone(), &t, noise.clone());
        let back = d.predict_xstart_from_eps(x_t.clone(), &t, noise.clone());
        let diff = (back - x0.clone()).abs().max().into_scalar();
        assert!(diff < 1e-3, "max error {diff}");

        let eps  = d.predict_eps_from_xstart(x_t, &t, x0);
        let diff = (eps - noise).abs().max().into_scalar();
        assert!(diff < 1e-2, "max error {diff}");
    }

    #[test]
    fn test_xprev_inverts_posterior_mean() {
        let d      = linear(50);
        let device = Default::default();
        let x0     = Tensor::<TestBackend, 4>::random([2, 1, 3, 3], Distribution::Uniform(-1.0, 1.0), &device);
        let x_t    = Tensor::<TestBackend, 4>::random([2, 1, 3, 3], Distribution::Normal(0.0, 1.0), &device);
        let t      = [10, 40];

        let (mean, _, _) = d.q_posterior_mean_variance(x0.clone(), x_t.clone(), &t);
        let back = d.predict_xstart_from_xprev(x_t, &t, mean);
        let diff = (back - x0).abs().max().into_scalar();
        assert!(diff < 1e-3, "max error {diff}");
    }

    #[test]
    fn test_learned_range_stays_between_bounds() {
        let betas  = get_betas(BetaSchedule::Linear, 100);
        let d      = GaussianDiffusion::new(betas, ModelMeanType::Eps, ModelVarType::LearnedRange);
        let device = Default::default();
        let x_t    = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let t      = [60];

        // variance channels at +1 give log beta, at -1 the clipped posterior
        let upper = Tensor::cat(vec![x_t.clone(), x_t.clone().ones_like()], 1);
        let out   = d.p_mean_variance(upper, x_t.clone(), &t, true);
        let got   = out.log_variance.mean().into_scalar() as f64;
        assert!((got - d.betas[60].ln()).abs() < 1e-4);

        let lower = Tensor::cat(vec![x_t.clone(), x_t.clone().ones_like().neg()], 1);
        let out   = d.p_mean_variance(lower, x_t, &t, true);
        let got   = out.log_variance.mean().into_scalar() as f64;
        assert!((got - d.posterior_log_variance_clipped[60]).abs() < 1e-4);
    }
}
