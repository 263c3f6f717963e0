// ============================================================
// Layer 7 — Inception Score and Fréchet Inception Distance
// ============================================================
//   IS  = exp( E_x KL( p(y|x) || p(y) ) )        per split, mean ± std
//   FID = ||mu1 - mu2||² + Tr(S1) + Tr(S2) - 2 Tr( sqrt(S1 S2) )
//
// Feature statistics and the matrix square root run in f64 on the
// NdArray backend regardless of the device that produced features.
//
// Reference: Salimans et al. (2016), Heusel et al. (2017),
//            Higham (2008) §6.7 (Newton–Schulz iteration)

use anyhow::{anyhow, bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, NdArray},
    prelude::*,
};

pub type StatsBackend = NdArray<f64>;

const SQRTM_MAX_ITERS: usize = 100;
const SQRTM_TOL: f64 = 1e-10;

fn to_host(t: Tensor<StatsBackend, 2>) -> Result<Vec<f64>> {
    t.into_data().to_vec::<f64>().map_err(|e| anyhow!("{e:?}"))
}

fn scalar(t: Tensor<StatsBackend, 1>) -> f64 {
    t.into_scalar()
}

// ─── Inception Score ─────────────────────────────────────────────────────────

/// `probs` is `[n, k]` row-major softmax output. Returns (mean, std)
/// over `splits` contiguous chunks, std being the population std.
pub fn inception_score(probs: &[f64], k: usize, splits: usize) -> Result<(f64, f64)> {
    if k == 0 || probs.len() % k != 0 {
        bail!("probability buffer of {} values is not a multiple of {k} classes", probs.len());
    }
    let n = probs.len() / k;
    if splits == 0 || n < splits {
        bail!("need at least {splits} samples for {splits} splits, got {n}");
    }

    let mut scores = Vec::with_capacity(splits);
    for s in 0..splits {
        let (lo, hi) = (s * n / splits, (s + 1) * n / splits);
        let rows = &probs[lo * k..hi * k];
        let m = (hi - lo) as f64;

        let mut py = vec![0.0; k];
        for row in rows.chunks_exact(k) {
            for (acc, p) in py.iter_mut().zip(row) {
                *acc += p;
            }
        }
        py.iter_mut().for_each(|p| *p /= m);

        let mut kl = 0.0;
        for row in rows.chunks_exact(k) {
            for (p, q) in row.iter().zip(&py) {
                if *p > 0.0 {
                    kl += p * (p.ln() - q.ln());
                }
            }
        }
        scores.push((kl / m).exp());
    }

    let mean = scores.iter().sum::<f64>() / splits as f64;
    let var  = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / splits as f64;
    Ok((mean, var.sqrt()))
}

// ─── Feature statistics ──────────────────────────────────────────────────────

/// Mean and covariance of Inception pool features.
#[derive(Debug, Clone, PartialEq)]
pub struct FidStats {
    pub mu:    Vec<f64>,
    /// `[dim, dim]` row-major
    pub sigma: Vec<f64>,
    pub dim:   usize,
}

/// Streaming accumulator of `Σx` and `Σxxᵀ`, fed batch by batch.
pub struct FeatureMoments {
    dim:    usize,
    count:  usize,
    sum:    Tensor<StatsBackend, 1>,
    outer:  Tensor<StatsBackend, 2>,
    device: NdArrayDevice,
}

impl FeatureMoments {
    pub fn new(dim: usize) -> Self {
        let device = NdArrayDevice::Cpu;
        Self {
            dim,
            count: 0,
            sum: Tensor::zeros([dim], &device),
            outer: Tensor::zeros([dim, dim], &device),
            device,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `features` is `[rows, dim]` row-major.
    pub fn push(&mut self, features: &[f32]) -> Result<()> {
        if features.len() % self.dim != 0 {
            bail!("feature buffer of {} values is not a multiple of dim {}", features.len(), self.dim);
        }
        let rows = features.len() / self.dim;
        if rows == 0 {
            return Ok(());
        }
        let data: Vec<f64> = features.iter().map(|&v| v as f64).collect();
        let x = Tensor::<StatsBackend, 2>::from_data(TensorData::new(data, [rows, self.dim]), &self.device);

        self.sum   = self.sum.clone() + x.clone().sum_dim(0).reshape([self.dim]);
        self.outer = self.outer.clone() + x.clone().transpose().matmul(x);
        self.count += rows;
        Ok(())
    }

    /// Unbiased covariance (divides by n - 1).
    pub fn finish(self) -> Result<FidStats> {
        if self.count < 2 {
            bail!("need at least 2 feature vectors for a covariance, got {}", self.count);
        }
        let n  = self.count as f64;
        let mu = self.sum.div_scalar(n);
        let mu_col = mu.clone().reshape([self.dim, 1]);
        let mean_outer = mu_col.clone().matmul(mu_col.transpose()).mul_scalar(n);
        let sigma = (self.outer - mean_outer).div_scalar(n - 1.0);

        Ok(FidStats {
            mu:    to_host(mu.reshape([1, self.dim]))?,
            sigma: to_host(sigma)?,
            dim:   self.dim,
        })
    }
}

impl FidStats {
    #[cfg(test)]
    pub fn from_features(features: &[f32], dim: usize) -> Result<Self> {
        let mut moments = FeatureMoments::new(dim);
        moments.push(features)?;
        moments.finish()
    }

    fn tensors(&self, device: &NdArrayDevice) -> (Tensor<StatsBackend, 1>, Tensor<StatsBackend, 2>) {
        let mu    = Tensor::from_data(TensorData::new(self.mu.clone(), [self.dim]), device);
        let sigma = Tensor::from_data(TensorData::new(self.sigma.clone(), [self.dim, self.dim]), device);
        (mu, sigma)
    }
}

// ─── FID ─────────────────────────────────────────────────────────────────────

fn trace(m: Tensor<StatsBackend, 2>) -> f64 {
    let n = m.dims()[0];
    let eye = Tensor::eye(n, &m.device());
    scalar((m * eye).sum())
}

fn frobenius(m: Tensor<StatsBackend, 2>) -> f64 {
    scalar(m.powf_scalar(2.0).sum()).sqrt()
}

/// Principal square root of a matrix with non-negative real spectrum
/// (here the product of two covariance matrices).
pub fn sqrtm(a: Tensor<StatsBackend, 2>) -> Tensor<StatsBackend, 2> {
    let n      = a.dims()[0];
    let device = a.device();
    let norm   = frobenius(a.clone());
    if norm == 0.0 {
        return a;
    }

    let eye   = Tensor::<StatsBackend, 2>::eye(n, &device);
    let mut y = a.clone().div_scalar(norm);
    let mut z = eye.clone();
    for i in 0..SQRTM_MAX_ITERS {
        let t = (eye.clone().mul_scalar(3.0) - z.clone().matmul(y.clone())).mul_scalar(0.5);
        y = y.matmul(t.clone());
        z = t.matmul(z);

        if i % 10 == 9 {
            let approx = y.clone().matmul(y.clone()).mul_scalar(norm);
            let err = frobenius(approx - a.clone()) / norm;
            if err < SQRTM_TOL {
                tracing::debug!("sqrtm converged after {} iterations", i + 1);
                break;
            }
        }
    }
    y.mul_scalar(norm.sqrt())
}

pub fn frechet_distance(a: &FidStats, b: &FidStats) -> Result<f64> {
    if a.dim != b.dim {
        bail!("feature dims differ: {} vs {}", a.dim, b.dim);
    }
    let device = NdArrayDevice::Cpu;
    let (mu1, s1) = a.tensors(&device);
    let (mu2, s2) = b.tensors(&device);

    let diff = mu1 - mu2;
    let mean_term = scalar(diff.powf_scalar(2.0).sum());
    let covmean   = sqrtm(s1.clone().matmul(s2.clone()));

    let fid = mean_term + trace(s1) + trace(s2) - 2.0 * trace(covmean);
    if !fid.is_finite() {
        bail!("FID is not finite ({fid})");
    }
    Ok(fid)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(n: usize, k: usize) -> Vec<f64> {
        let mut p = vec![0.0; n * k];
        for i in 0..n {
            p[i * k + i % k] = 1.0;
        }
        p
    }

    #[test]
    fn test_inception_score_of_distinct_confident_classes() {
        let (is, std) = inception_score(&one_hot(10, 10), 10, 1).unwrap();
        assert!((is - 10.0).abs() < 1e-9);
        assert_eq!(std, 0.0);

        // each half sees 5 distinct classes
        let (is, _) = inception_score(&one_hot(10, 10), 10, 2).unwrap();
        assert!((is - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_inception_score_of_identical_predictions_is_one() {
        let probs: Vec<f64> = (0..20).flat_map(|_| [0.2, 0.3, 0.5]).collect();
        let (is, std) = inception_score(&probs, 3, 10).unwrap();
        assert!((is - 1.0).abs() < 1e-12);
        assert!(std < 1e-12);
    }

    #[test]
    fn test_inception_score_needs_enough_samples() {
        assert!(inception_score(&one_hot(5, 10), 10, 10).is_err());
    }

    #[test]
    fn test_stats_from_features() {
        let stats = FidStats::from_features(&[1.0, 2.0, 3.0, 6.0], 2).unwrap();
        assert_eq!(stats.dim, 2);
        for (a, b) in stats.mu.iter().zip([2.0, 4.0]) {
            assert!((a - b).abs() < 1e-12);
        }
        for (a, b) in stats.sigma.iter().zip([2.0, 4.0, 4.0, 8.0]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_streaming_moments_match_single_pass() {
        let feats: Vec<f32> = (0..24).map(|i| ((i * 7) % 11) as f32 * 0.5).collect();
        let whole = FidStats::from_features(&feats, 3).unwrap();

        let mut m = FeatureMoments::new(3);
        m.push(&feats[..9]).unwrap();
        m.push(&feats[9..]).unwrap();
        assert_eq!(m.count(), 8);
        let streamed = m.finish().unwrap();

        for (a, b) in whole.sigma.iter().zip(&streamed.sigma) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sqrtm_of_diagonal() {
        let device = NdArrayDevice::Cpu;
        let a = Tensor::<StatsBackend, 2>::from_data(TensorData::new(vec![4.0, 0.0, 0.0, 9.0], [2, 2]), &device);
        let r = to_host(sqrtm(a)).unwrap();
        for (x, y) in r.iter().zip([2.0, 0.0, 0.0, 3.0]) {
            assert!((x - y).abs() < 1e-8);
        }
    }

    #[test]
    fn test_frechet_distance_closed_form() {
        let a = FidStats { mu: vec![0.0, 0.0], sigma: vec![1.0, 0.0, 0.0, 4.0], dim: 2 };
        let b = FidStats { mu: vec![1.0, 2.0], sigma: vec![4.0, 0.0, 0.0, 9.0], dim: 2 };
        // 5 + (5 + 13) - 2 (2 + 6)
        assert!((frechet_distance(&a, &b).unwrap() - 7.0).abs() < 1e-8);
        assert!(frechet_distance(&a, &a).unwrap().abs() < 1e-8);
    }

    #[test]
    fn test_frechet_distance_rejects_dim_mismatch() {
        let a = FidStats { mu: vec![0.0], sigma: vec![1.0], dim: 1 };
        let b = FidStats { mu: vec![0.0, 0.0], sigma: vec![1.0, 0.0, 0.0, 1.0], dim: 2 };
        assert!(frechet_distance(&a, &b).is_err());
    }
}
