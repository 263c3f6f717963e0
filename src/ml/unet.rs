// ============================================================
// Layer 5 — U-Net Denoiser
// ============================================================
// Architecture (defaults: dim = 64, dim_mults = (1, 2, 4, 8)):
//
//   x ─ init_conv 7x7 ─┬──────────────────────────────────┐ r
//                      ▼                                  │
//   per level (din → dout):                               │
//     ResnetBlock ── skip ─┐                              │
//     ResnetBlock          │                              │
//     LinearAttention ─ skip ─┐                           │
//     Resample down  (stride-2 except the last level)     │
//                      ▼   │  │                           │
//   mid: ResnetBlock → Attention → ResnetBlock            │
//                      ▼   │  │                           │
//   per level, reversed:   │  │                           │
//     cat(skip) ResnetBlock◄──┘                           │
//     cat(skip) ResnetBlock◄┘                             │
//     LinearAttention                                     │
//     Resample up (nearest x2 except the last level)      │
//                      ▼                                  │
//   cat(r) ─ ResnetBlock ─ 1x1 conv ─ out ◄───────────────┘
//
// Every ResnetBlock is conditioned on an MLP of the sinusoidal
// embedding of t. With a learned variance the output carries twice
// the input channels: [mean part | variance part].
//
// Reference: Ho et al. (2020), lucidrains/denoising-diffusion-pytorch

use anyhow::{ensure, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::gelu,
};

use crate::diffusion::Denoiser;
use crate::ml::blocks::{timestep_embedding, Attention, LinearAttention, ResnetBlock, Resample};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct UnetConfig {
    #[config(default = 64)]
    pub dim: usize,
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 3)]
    pub out_channels: usize,
    #[config(default = "vec![1, 2, 4, 8]")]
    pub dim_mults: Vec<usize>,
    #[config(default = 8)]
    pub resnet_groups: usize,
    #[config(default = 4)]
    pub attn_heads: usize,
    #[config(default = 32)]
    pub attn_dim_head: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl UnetConfig {
    /// Channel counts of every level boundary: [dim, dim*m1, dim*m2, ..].
    fn dims(&self) -> Vec<usize> {
        std::iter::once(self.dim)
            .chain(self.dim_mults.iter().map(|m| self.dim * m))
            .collect()
    }

    /// Reject settings that would make GroupNorm or attention ill-formed.
    pub fn check(&self) -> Result<()> {
        ensure!(!self.dim_mults.is_empty(), "dim_mults must not be empty");
        ensure!(self.dim % 2 == 0, "dim must be even for the sinusoidal embedding, got {}", self.dim);
        for d in self.dims() {
            ensure!(
                d % self.resnet_groups == 0,
                "channel count {d} is not divisible by resnet_groups={}",
                self.resnet_groups
            );
        }
        let mid = self.dim * self.dim_mults[self.dim_mults.len() - 1];
        ensure!(mid % self.attn_heads == 0, "mid channels {mid} not divisible by attn_heads={}", self.attn_heads);
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Unet<B> {
        let dims     = self.dims();
        let time_dim = self.dim * 4;
        let levels   = self.dim_mults.len();
        let in_out: Vec<(usize, usize)> = dims.windows(2).map(|w| (w[0], w[1])).collect();

        let block = |din: usize, dout: usize| {
            ResnetBlock::new(din, dout, time_dim, self.resnet_groups, self.dropout, device)
        };

        let downs = in_out
            .iter()
            .enumerate()
            .map(|(i, &(din, dout))| DownStage {
                block1: block(din, din),
                block2: block(din, din),
                attn:   LinearAttention::new(din, self.attn_heads, self.attn_dim_head, device),
                down:   Resample::down(din, dout, if i + 1 < levels { 2 } else { 1 }, device),
            })
            .collect();

        let mid_dim = dims[dims.len() - 1];

        let ups = in_out
            .iter()
            .rev()
            .enumerate()
            .map(|(i, &(din, dout))| UpStage {
                block1: block(dout + din, dout),
                block2: block(dout + din, dout),
                attn:   LinearAttention::new(dout, self.attn_heads, self.attn_dim_head, device),
                up:     Resample::up(dout, din, if i + 1 < levels { 2 } else { 1 }, device),
            })
            .collect();

        Unet {
            init_conv: Conv2dConfig::new([self.channels, self.dim], [7, 7])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .init(device),
            time_mlp_in:  LinearConfig::new(self.dim, time_dim).init(device),
            time_mlp_out: LinearConfig::new(time_dim, time_dim).init(device),
            downs,
            mid_block1: block(mid_dim, mid_dim),
            mid_attn:   Attention::new(mid_dim, self.attn_heads, device),
            mid_block2: block(mid_dim, mid_dim),
            ups,
            final_block: block(self.dim * 2, self.dim),
            final_conv:  Conv2dConfig::new([self.dim, self.out_channels], [1, 1]).init(device),
            dim: self.dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    pub block1: ResnetBlock<B>,
    pub block2: ResnetBlock<B>,
    pub attn:   LinearAttention<B>,
    pub down:   Resample<B>,
}

#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    pub block1: ResnetBlock<B>,
    pub block2: ResnetBlock<B>,
    pub attn:   LinearAttention<B>,
    pub up:     Resample<B>,
}

#[derive(Module, Debug)]
pub struct Unet<B: Backend> {
    pub init_conv:    Conv2d<B>,
    pub time_mlp_in:  Linear<B>,
    pub time_mlp_out: Linear<B>,
    pub downs:        Vec<DownStage<B>>,
    pub mid_block1:   ResnetBlock<B>,
    pub mid_attn:     Attention<B>,
    pub mid_block2:   ResnetBlock<B>,
    pub ups:          Vec<UpStage<B>>,
    pub final_block:  ResnetBlock<B>,
    pub final_conv:   Conv2d<B>,
    pub dim:          usize,
}

impl<B: Backend> Unet<B> {
    /// x: [b, channels, h, w], time: [b] → [b, out_channels, h, w]
    pub fn forward(&self, x: Tensor<B, 4>, time: Tensor<B, 1>) -> Tensor<B, 4> {
        let t = timestep_embedding(time, self.dim);
        let t = self.time_mlp_out.forward(gelu(self.time_mlp_in.forward(t)));

        let mut x = self.init_conv.forward(x);
        let r     = x.clone();

        let mut skips = Vec::with_capacity(self.downs.len());
        for stage in &self.downs {
            x = stage.block1.forward(x, t.clone());
            let s1 = x.clone();
            x = stage.attn.forward(stage.block2.forward(x, t.clone()));
            skips.push((s1, x.clone()));
            x = stage.down.forward(x);
        }

        x = self.mid_block1.forward(x, t.clone());
        x = self.mid_attn.forward(x);
        x = self.mid_block2.forward(x, t.clone());

        for (stage, (s1, s2)) in self.ups.iter().zip(skips.into_iter().rev()) {
            x = stage.block1.forward(Tensor::cat(vec![x, s2], 1), t.clone());
            x = stage.block2.forward(Tensor::cat(vec![x, s1], 1), t.clone());
            x = stage.up.forward(stage.attn.forward(x));
        }

        let x = self.final_block.forward(Tensor::cat(vec![x, r], 1), t);
        self.final_conv.forward(x)
    }
}

impl<B: Backend> Denoiser<B> for Unet<B> {
    fn denoise(&self, x: Tensor<B, 4>, timesteps: Tensor<B, 1>) -> Tensor<B, 4> {
        self.forward(x, timesteps)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    /// Small enough for CPU tests, same topology as the default.
    pub(crate) fn tiny_config(out_channels: usize) -> UnetConfig {
        UnetConfig::new()
            .with_dim(16)
            .with_out_channels(out_channels)
            .with_dim_mults(vec![1, 2])
            .with_attn_dim_head(8)
    }

    #[test]
    fn test_output_shape_matches_input() {
        let device = Default::default();
        let model  = tiny_config(3).init::<TestBackend>(&device);
        let x      = Tensor::random([2, 3, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let t      = Tensor::from_floats([3.0, 999.0], &device);
        assert_eq!(model.forward(x, t).dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn test_learned_variance_doubles_channels() {
        let device = Default::default();
        let model  = tiny_config(6).init::<TestBackend>(&device);
        let x      = Tensor::zeros([1, 3, 8, 8], &device);
        let t      = Tensor::from_floats([0.5], &device);
        assert_eq!(model.denoise(x, t).dims(), [1, 6, 8, 8]);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(UnetConfig::new().check().is_ok());
        assert!(UnetConfig::new().with_dim(12).check().is_err());
        assert!(UnetConfig::new().with_dim_mults(vec![]).check().is_err());
    }
}
