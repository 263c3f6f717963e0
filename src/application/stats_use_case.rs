// ============================================================
// Layer 2 — StatsUseCase
// ============================================================
// Computes the reference statistics FID compares against:
//
//   Step 1: Load a CIFAR-10 split                 (Layer 4 - data)
//   Step 2: Load the Inception network            (Layer 7 - scoring)
//   Step 3: Stream pool features into moments     (Layer 7 - scoring)
//   Step 4: Write mu / sigma as safetensors       (Layer 7 - scoring)
//
// Images go through the plain batcher: no flips, values in [0, 1].

use std::path::PathBuf;

use anyhow::Result;
use burn::{
    backend::{NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::run_config::RunConfig;
use crate::data::{
    batcher::ImageBatcher,
    cifar::{Cifar10, Split},
    dataset::ImageDataset,
};
use crate::domain::options::BackendKind;
use crate::infra::world::{ComputeBackend, World};
use crate::scoring::{
    inception::FEATURE_DIM,
    score::FeatureMoments,
    stats::{save_stats, stats_file_name},
    FeatureExtractor,
};

pub struct StatsUseCase {
    config: RunConfig,
    split:  Split,
    output: Option<PathBuf>,
}

impl StatsUseCase {
    pub fn new(config: RunConfig, split: Split, output: Option<PathBuf>) -> Self {
        Self { config, split, output }
    }

    /// Where the statistics will be written.
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            self.config
                .dataset_stats_path
                .join(stats_file_name("cifar10", self.split.as_str()))
        })
    }

    /// Returns the path the statistics were written to.
    pub fn execute(&self) -> Result<PathBuf> {
        match self.config.backend {
            BackendKind::Wgpu    => self.execute_on::<Wgpu>(),
            BackendKind::Ndarray => self.execute_on::<NdArray>(),
        }
    }

    fn execute_on<B: ComputeBackend>(&self) -> Result<PathBuf> {
        let cfg    = &self.config;
        let world  = World::<B>::from_gpus(&cfg.gpus)?;
        let device = world.main_device().clone();

        // ── Step 1: Images ───────────────────────────────────────────────────
        let items = Cifar10::new(&cfg.dataset_dir).load(self.split)?;
        let total = items.len();
        tracing::info!("Computing Inception statistics of {} {} images", total, self.split.as_str());

        // ── Step 2: Network ──────────────────────────────────────────────────
        let extractor = FeatureExtractor::<B>::load(&cfg.inception_weights, cfg.inception_batch_size, &device)?;

        // ── Step 3: Features ─────────────────────────────────────────────────
        let loader = DataLoaderBuilder::new(ImageBatcher::<B>::plain(device.clone()))
            .batch_size(cfg.inception_batch_size.max(1))
            .build(ImageDataset::new(items));

        let bar = ProgressBar::new(total as u64);
        bar.set_style(ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?);
        bar.set_message("features");

        let mut moments = FeatureMoments::new(FEATURE_DIM);
        for batch in loader.iter() {
            let n = batch.images.dims()[0];
            let (pool, _) = extractor.forward_batch(batch.images)?;
            moments.push(&pool)?;
            bar.inc(n as u64);
        }
        bar.finish_and_clear();
        tracing::info!("Accumulated {} feature vectors", moments.count());

        // ── Step 4: Write ────────────────────────────────────────────────────
        let stats = moments.finish()?;
        let path  = self.output_path();
        save_stats(&path, &stats)?;
        Ok(path)
    }
}
