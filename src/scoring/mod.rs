// ============================================================
// Layer 7 — Sample Quality Scoring
// ============================================================
//   ImageSet [0,1] ─► InceptionV3 ─┬─ softmax(logits) ─► Inception Score
//                                  └─ pool features ───► FeatureMoments
//                                                        ─► FID vs reference
//
//   weights.rs    — safetensors → host tensors
//   inception.rs  — the FID Inception-v3 network
//   score.rs      — IS, feature statistics, Fréchet distance
//   stats.rs      — reference statistics file

pub mod inception;
pub mod score;
pub mod stats;
pub mod weights;

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use burn::{prelude::*, tensor::activation::softmax};

use crate::domain::image_set::ImageSet;
use inception::{InceptionV3, FEATURE_DIM, NUM_LOGITS};
use score::{frechet_distance, inception_score, FeatureMoments, FidStats};
use weights::WeightStore;

pub const IS_SPLITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub is:     f64,
    pub is_std: f64,
    pub fid:    f64,
}

impl std::fmt::Display for Scores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IS: {:.4}, IS_std: {:.4}, FID: {:.4}", self.is, self.is_std, self.fid)
    }
}

/// Inception network without reference statistics. Enough to compute
/// the statistics of a dataset.
pub struct FeatureExtractor<B: Backend> {
    network:    InceptionV3<B>,
    batch_size: usize,
    device:     B::Device,
}

impl<B: Backend> FeatureExtractor<B> {
    pub fn load(weights: &Path, batch_size: usize, device: &B::Device) -> Result<Self> {
        let store = WeightStore::open(weights)
            .with_context(|| format!("Cannot load Inception weights '{}'", weights.display()))?;
        if store.is_empty() {
            anyhow::bail!("'{}' holds no tensors", weights.display());
        }
        let network = InceptionV3::load(&store, device)
            .with_context(|| format!("Incompatible Inception weights in '{}'", weights.display()))?;
        tracing::info!("Loaded Inception-v3 ({} tensors) from '{}'", store.len(), weights.display());
        Ok(Self { network, batch_size: batch_size.max(1), device: device.clone() })
    }

    /// Pool features and class probabilities (row-major) of one batch
    /// of images in `[0, 1]`.
    pub fn forward_batch(&self, images: Tensor<B, 4>) -> Result<(Vec<f32>, Vec<f32>)> {
        let out   = self.network.forward(images.to_device(&self.device));
        let probs = softmax(out.logits, 1);

        let pool  = out.pool.into_data().convert::<f32>().to_vec::<f32>().map_err(|e| anyhow!("{e:?}"))?;
        let probs = probs.into_data().convert::<f32>().to_vec::<f32>().map_err(|e| anyhow!("{e:?}"))?;
        Ok((pool, probs))
    }

    /// Run `images` through the network in batches, handing each batch's
    /// pool features and class probabilities to `sink`.
    pub fn for_each_batch(
        &self,
        images: &ImageSet,
        mut sink: impl FnMut(&[f32], &[f32]) -> Result<()>,
    ) -> Result<()> {
        let len = images.image_len();
        for start in (0..images.count).step_by(self.batch_size) {
            let n = self.batch_size.min(images.count - start);
            let data = images.data[start * len..(start + n) * len].to_vec();
            let x = Tensor::<B, 4>::from_data(
                TensorData::new(data, [n, images.channels, images.height, images.width]),
                &self.device,
            );
            let (pool, probs) = self.forward_batch(x)?;
            sink(&pool, &probs)?;
        }
        Ok(())
    }
}

/// Inception network paired with the reference statistics FID is measured against.
pub struct InceptionScorer<B: Backend> {
    extractor: FeatureExtractor<B>,
    reference: FidStats,
}

impl<B: Backend> InceptionScorer<B> {
    pub fn load(weights: &Path, stats: &Path, batch_size: usize, device: &B::Device) -> Result<Self> {
        let extractor = FeatureExtractor::load(weights, batch_size, device)?;
        let reference = stats::load_stats(stats)
            .with_context(|| format!("Cannot load FID statistics '{}'", stats.display()))?;
        if reference.dim != FEATURE_DIM {
            anyhow::bail!("FID statistics have dim {}, expected {FEATURE_DIM}", reference.dim);
        }
        Ok(Self { extractor, reference })
    }

    /// Inception Score (10 splits) and FID of `images` in `[0, 1]`.
    pub fn score(&self, images: &ImageSet) -> Result<Scores> {
        let mut moments = FeatureMoments::new(FEATURE_DIM);
        let mut probs   = Vec::with_capacity(images.count * NUM_LOGITS);
        self.extractor.for_each_batch(images, |pool, p| {
            probs.extend(p.iter().map(|&v| v as f64));
            moments.push(pool)
        })?;

        let (is, is_std) = inception_score(&probs, NUM_LOGITS, IS_SPLITS)?;
        let fid = frechet_distance(&moments.finish()?, &self.reference)?;
        Ok(Scores { is, is_std, fid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_line_format() {
        let s = Scores { is: 7.123456, is_std: 0.1, fid: 25.5 };
        assert_eq!(s.to_string(), "IS: 7.1235, IS_std: 0.1000, FID: 25.5000");
    }

    #[test]
    fn test_missing_weights_fail_to_load() {
        let device = Default::default();
        let res = FeatureExtractor::<burn::backend::NdArray>::load(Path::new("/no/inception.safetensors"), 50, &device);
        assert!(res.is_err());
    }

    #[test]
    fn test_empty_weights_file_is_rejected() {
        let dir   = tempfile::tempdir().unwrap();
        let path  = dir.path().join("empty.safetensors");
        let none: Vec<(String, safetensors::tensor::TensorView)> = Vec::new();
        std::fs::write(&path, safetensors::serialize(none, &None).unwrap()).unwrap();

        let device = Default::default();
        let err = FeatureExtractor::<burn::backend::NdArray>::load(&path, 50, &device).err().unwrap();
        assert!(err.to_string().contains("holds no tensors"));
    }
}
