// ============================================================
// Layer 5 — Sampling and Evaluation
// ============================================================
// Generation fans out over the world; scoring happens on rank 0.
//
//   rank r: m = ceil(n / world) samples, chunks of batch_size
//           sampler → [-1, 1] → (x + 1) / 2 → clamp [0, 1] → host
//   gather: concat in rank order, truncate to n
//   rank 0: Inception → IS / FID
//
// Reference: Burn Book §6 (Inference), Rust Book §16

use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::diffusion::sampler::DiffusionSampler;
use crate::domain::image_set::ImageSet;
use crate::infra::{
    metrics::{EvalRow, MetricsLogger},
    world::World,
};
use crate::ml::unet::Unet;
use crate::scoring::{InceptionScorer, Scores};

/// Which set of weights an evaluation ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weights {
    Model,
    Ema,
}

impl Weights {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weights::Model => "model",
            Weights::Ema   => "ema",
        }
    }
}

fn progress_bar(len: usize, what: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.green/white} {pos}/{len} {msg}")?);
    bar.set_message(what.to_string());
    Ok(bar)
}

/// Map sampler output in [-1, 1] to host images in [0, 1].
pub fn to_image_set<B: Backend>(samples: Tensor<B, 4>) -> Result<ImageSet> {
    let [n, c, h, w] = samples.dims();
    let data = samples
        .add_scalar(1.0)
        .div_scalar(2.0)
        .clamp(0.0, 1.0)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("{e:?}"))?;
    Ok(ImageSet::new(data, n, c, h, w))
}

/// Draw `n` images from `model` across every device of `world`.
pub fn generate_images<B: Backend>(
    world:      &World<B>,
    model:      &Unet<B>,
    sampler:    &DiffusionSampler,
    n:          usize,
    batch_size: usize,
    image_dims: [usize; 3],
) -> Result<ImageSet> {
    let per_rank   = world.per_rank(n);
    let batch_size = batch_size.max(1);
    let [c, h, w]  = image_dims;
    let bar        = progress_bar(per_rank * world.size(), "sampling")?;

    let replicas: Vec<Unet<B>> = world
        .devices()
        .iter()
        .enumerate()
        .map(|(rank, device)| if rank == 0 { model.clone() } else { model.clone().fork(device) })
        .collect();

    let parts = world.run(replicas, |_rank, device, replica| {
        let mut chunks = Vec::new();
        let mut left   = per_rank;
        while left > 0 {
            let k = batch_size.min(left);
            let samples = sampler.sample(&replica, [k, c, h, w], device);
            chunks.push(to_image_set(samples)?);
            bar.inc(k as u64);
            left -= k;
        }
        Ok(ImageSet::concat(chunks).unwrap_or_else(|| ImageSet::empty(c, h, w)))
    })?;
    bar.finish_and_clear();

    let mut images = ImageSet::concat(parts).ok_or_else(|| anyhow!("workers returned mismatched images"))?;
    images.truncate(n);
    Ok(images)
}

/// Evaluates a model's samples and records the result.
pub struct Evaluator<'a, B: Backend> {
    pub world:      &'a World<B>,
    pub sampler:    &'a DiffusionSampler,
    pub scorer:     &'a InceptionScorer<B>,
    pub n_samples:  usize,
    pub batch_size: usize,
    pub image_dims: [usize; 3],
}

impl<'a, B: Backend> Evaluator<'a, B> {
    pub fn evaluate(&self, model: &Unet<B>) -> Result<Scores> {
        let images = generate_images(
            self.world,
            model,
            self.sampler,
            self.n_samples,
            self.batch_size,
            self.image_dims,
        )?;
        self.scorer.score(&images).context("Scoring generated samples failed")
    }

    /// Evaluate, print the score line and append it to the eval log.
    pub fn evaluate_and_log(
        &self,
        model:   &Unet<B>,
        weights: Weights,
        step:    usize,
        log:     Option<&MetricsLogger<EvalRow>>,
    ) -> Result<Scores> {
        tracing::info!("Evaluating {} weights at step {} ({} samples)", weights.as_str(), step, self.n_samples);
        let scores = self.evaluate(model)?;
        println!("{scores}");

        if let Some(log) = log {
            log.log(&EvalRow {
                step,
                weights: weights.as_str().to_string(),
                is:      scores.is,
                is_std:  scores.is_std,
                fid:     scores.fid,
            })?;
        }
        Ok(scores)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::diffusion::{
        sampler::SamplerSettings,
        schedule::{get_betas, GaussianDiffusion},
    };
    use crate::domain::options::{BetaSchedule, KarrasMethod, ModelMeanType, ModelVarType, SamplerKind};
    use crate::ml::unet::tests::tiny_config;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ddim(steps: usize) -> DiffusionSampler {
        let diffusion = GaussianDiffusion::new(
            get_betas(BetaSchedule::Linear, 100),
            ModelMeanType::Eps,
            ModelVarType::FixedSmall,
        );
        DiffusionSampler::new(
            diffusion,
            SamplerSettings {
                kind:          SamplerKind::Ddim,
                num_steps:     steps,
                karras_method: KarrasMethod::Heun,
                ddim_eta:      0.0,
                clip_denoised: true,
            },
        )
    }

    #[test]
    fn test_to_image_set_maps_and_clamps() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-1.0, 0.0, 1.0, 3.0], &device).reshape([1, 1, 2, 2]);
        let set = to_image_set(x).unwrap();
        assert_eq!((set.count, set.channels, set.height, set.width), (1, 1, 2, 2));
        assert_eq!(set.data, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn test_generate_gathers_and_truncates() {
        let device = Default::default();
        let world  = World::<TestBackend>::from_gpus(&[0, 1]).unwrap();
        let model  = tiny_config(3).init::<TestBackend>(&device);

        // 2 ranks x ceil(5 / 2) = 6 drawn, 5 kept
        let images = generate_images(&world, &model, &ddim(2), 5, 2, [3, 8, 8]).unwrap();
        assert_eq!(images.count, 5);
        assert_eq!(images.data.len(), 5 * 3 * 8 * 8);
        assert!(images.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_weights_names() {
        assert_eq!(Weights::Model.as_str(), "model");
        assert_eq!(Weights::Ema.as_str(), "ema");
    }
}
