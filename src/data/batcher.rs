// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<ImageItem> into
// one float tensor of shape [batch, channels, height, width].
//
//   u8 pixel  →  f32 in [0, 1]  →  (optional) horizontal flip
//
// The training loop maps [0, 1] to [-1, 1] itself, so the same
// batcher also feeds the Inception statistics pass, which wants [0, 1].
//
// Reference: Burn Book §4 (Batcher)

use std::sync::{Arc, Mutex};

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::ImageItem;

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// [batch, channels, height, width], values in [0, 1]
    pub images: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,

    /// Probability of mirroring each image left-to-right
    pub flip_prob: f64,

    /// Flip decisions; shared by every loader worker
    rng: Arc<Mutex<StdRng>>,
}

impl<B: Backend> ImageBatcher<B> {
    /// Batcher used for training: random horizontal flips drawn from `seed`.
    pub fn train(device: B::Device, seed: u64) -> Self {
        Self::with_flips(device, 0.5, seed)
    }

    /// Batcher that leaves images untouched.
    pub fn plain(device: B::Device) -> Self {
        Self::with_flips(device, 0.0, 0)
    }

    pub fn with_flips(device: B::Device, flip_prob: f64, seed: u64) -> Self {
        Self { device, flip_prob, rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))) }
    }

    fn flips(&self, n: usize) -> Vec<bool> {
        if self.flip_prob <= 0.0 {
            return vec![false; n];
        }
        // a poisoned lock only means another worker panicked mid-draw
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..n).map(|_| rng.gen_bool(self.flip_prob.min(1.0))).collect()
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let [c, h, w]  = items.first().map(ImageItem::shape).unwrap_or([0, 0, 0]);
        let flips      = self.flips(batch_size);

        let mut flat: Vec<f32> = Vec::with_capacity(batch_size * c * h * w);
        for (item, flip) in items.iter().zip(flips) {
            push_image(&mut flat, &item.pixels, w, flip);
        }

        let images = Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([batch_size, c, h, w]);

        ImageBatch { images }
    }
}

/// Append one CHW image scaled to [0, 1], mirrored along the width when `flip`.
fn push_image(out: &mut Vec<f32>, pixels: &[u8], width: usize, flip: bool) {
    for row in pixels.chunks_exact(width) {
        if flip {
            out.extend(row.iter().rev().map(|&p| p as f32 / 255.0));
        } else {
            out.extend(row.iter().map(|&p| p as f32 / 255.0));
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ramp_item() -> ImageItem {
        // one channel, 2x3, values 0..6
        ImageItem { pixels: vec![0, 51, 102, 153, 204, 255], channels: 1, height: 2, width: 3 }
    }

    #[test]
    fn test_scales_to_unit_range() {
        let batcher = ImageBatcher::<TestBackend>::plain(Default::default());
        let batch   = batcher.batch(vec![ramp_item(), ramp_item()]);
        assert_eq!(batch.images.dims(), [2, 1, 2, 3]);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!((values[1] - 0.2).abs() < 1e-6);
        assert!((values[5] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_flip_mirrors_each_row() {
        let batcher = ImageBatcher::<TestBackend>::with_flips(Default::default(), 1.0, 0);
        let values  = batcher.batch(vec![ramp_item()]).images.into_data().to_vec::<f32>().unwrap();
        let expect  = [102.0, 51.0, 0.0, 255.0, 204.0, 153.0].map(|p: f32| p / 255.0);
        for (v, e) in values.iter().zip(expect) {
            assert!((v - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_same_seed_gives_same_flips() {
        let items = || (0..32).map(|_| ramp_item()).collect::<Vec<_>>();
        let run   = |seed| {
            let batcher = ImageBatcher::<TestBackend>::train(Default::default(), seed);
            let first   = batcher.batch(items()).images.into_data().to_vec::<f32>().unwrap();
            let second  = batcher.batch(items()).images.into_data().to_vec::<f32>().unwrap();
            (first, second)
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }
}
