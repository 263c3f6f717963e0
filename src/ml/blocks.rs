// ============================================================
// Layer 5 — U-Net Building Blocks
// ============================================================
//   timestep_embedding — sinusoidal features of (fractional) t
//   ResnetBlock        — conv → GN → scale/shift by t → SiLU, twice, + skip
//   LinearAttention    — O(n) attention used at every resolution
//   Attention          — full multi-head attention for the bottleneck
//   Resample           — strided conv down / nearest-neighbour up
//
// Reference: Ho et al. (2020) Appendix B, Shen et al. (2021) linear attention

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig, GroupNorm, GroupNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::{silu, softmax},
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Sinusoidal embedding `[sin(t f_i), cos(t f_i)]` with
/// `f_i = exp(-ln(10000) i / (half - 1))`. Output: [batch, dim].
pub fn timestep_embedding<B: Backend>(timesteps: Tensor<B, 1>, dim: usize) -> Tensor<B, 2> {
    let device  = timesteps.device();
    let [batch] = timesteps.dims();
    let half    = dim / 2;
    let scale   = 10000f64.ln() / (half.max(2) - 1) as f64;

    let freqs: Vec<f32> = (0..half).map(|i| (-(i as f64) * scale).exp() as f32).collect();
    let freqs = Tensor::<B, 1>::from_data(TensorData::new(freqs, [half]), &device);

    let args = timesteps.reshape([batch, 1]) * freqs.reshape([1, half]);
    Tensor::cat(vec![args.clone().sin(), args.cos()], 1)
}

fn conv3x3<B: Backend>(channels: [usize; 2], stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

fn conv1x1<B: Backend>(channels: [usize; 2], bias: bool, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new(channels, [1, 1]).with_bias(bias).init(device)
}

// ─── ResnetBlock ──────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ResnetBlock<B: Backend> {
    pub time_mlp: Linear<B>,
    pub conv1:    Conv2d<B>,
    pub norm1:    GroupNorm<B>,
    pub conv2:    Conv2d<B>,
    pub norm2:    GroupNorm<B>,
    pub dropout:  Dropout,
    pub res_conv: Option<Conv2d<B>>,
}

impl<B: Backend> ResnetBlock<B> {
    pub fn new(
        dim_in:   usize,
        dim_out:  usize,
        time_dim: usize,
        groups:   usize,
        dropout:  f64,
        device:   &B::Device,
    ) -> Self {
        Self {
            time_mlp: LinearConfig::new(time_dim, dim_out * 2).init(device),
            conv1:    conv3x3([dim_in, dim_out], 1, device),
            norm1:    GroupNormConfig::new(groups, dim_out).init(device),
            conv2:    conv3x3([dim_out, dim_out], 1, device),
            norm2:    GroupNormConfig::new(groups, dim_out).init(device),
            dropout:  DropoutConfig::new(dropout).init(),
            res_conv: (dim_in != dim_out).then(|| conv1x1([dim_in, dim_out], true, device)),
        }
    }

    /// x: [b, dim_in, h, w], time_emb: [b, time_dim] → [b, dim_out, h, w]
    pub fn forward(&self, x: Tensor<B, 4>, time_emb: Tensor<B, 2>) -> Tensor<B, 4> {
        let [b, _, _, _] = x.dims();

        let scale_shift = self.time_mlp.forward(silu(time_emb));
        let [_, two_c]  = scale_shift.dims();
        let c           = two_c / 2;
        let scale_shift = scale_shift.reshape([b, two_c, 1, 1]);
        let scale       = scale_shift.clone().slice([0..b, 0..c, 0..1, 0..1]);
        let shift       = scale_shift.slice([0..b, c..two_c, 0..1, 0..1]);

        let h = self.norm1.forward(self.conv1.forward(x.clone()));
        let h = silu(h * (scale + 1.0) + shift);
        let h = self.conv2.forward(self.dropout.forward(h));
        let h = silu(self.norm2.forward(h));

        let residual = match &self.res_conv {
            Some(conv) => conv.forward(x),
            None       => x,
        };
        h + residual
    }
}

// ─── LinearAttention ──────────────────────────────────────────────────────────
// softmax over features for q, over positions for k, then
// context = k v^T  (d x d per head), out = context^T q.

#[derive(Module, Debug)]
pub struct LinearAttention<B: Backend> {
    pub norm:     GroupNorm<B>,
    pub to_qkv:   Conv2d<B>,
    pub to_out:   Conv2d<B>,
    pub out_norm: GroupNorm<B>,
    pub heads:    usize,
    pub dim_head: usize,
}

impl<B: Backend> LinearAttention<B> {
    pub fn new(dim: usize, heads: usize, dim_head: usize, device: &B::Device) -> Self {
        let hidden = heads * dim_head;
        Self {
            norm:     GroupNormConfig::new(1, dim).init(device),
            to_qkv:   conv1x1([dim, hidden * 3], false, device),
            to_out:   conv1x1([hidden, dim], true, device),
            out_norm: GroupNormConfig::new(1, dim).init(device),
            heads,
            dim_head,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, _, h, w] = x.dims();
        let (heads, d)   = (self.heads, self.dim_head);
        let hidden       = heads * d;
        let n            = h * w;

        let qkv  = self.to_qkv.forward(self.norm.forward(x.clone()));
        let part = |i: usize| {
            qkv.clone()
                .slice([0..b, i * hidden..(i + 1) * hidden, 0..h, 0..w])
                .reshape([b, heads, d, n])
        };

        let q = softmax(part(0), 2) * (d as f64).powf(-0.5);
        let k = softmax(part(1), 3);
        let v = part(2) / n as f64;

        let context = k.matmul(v.swap_dims(2, 3));          // [b, heads, d, d]
        let out     = context.swap_dims(2, 3).matmul(q);    // [b, heads, d, n]
        let out     = out.reshape([b, hidden, h, w]);

        self.out_norm.forward(self.to_out.forward(out)) + x
    }
}

// ─── Attention ────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    pub norm: GroupNorm<B>,
    pub mha:  MultiHeadAttention<B>,
}

impl<B: Backend> Attention<B> {
    pub fn new(dim: usize, heads: usize, device: &B::Device) -> Self {
        Self {
            norm: GroupNormConfig::new(1, dim).init(device),
            mha:  MultiHeadAttentionConfig::new(dim, heads).with_dropout(0.0).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = x.dims();
        let seq = self.norm.forward(x.clone())
            .reshape([b, c, h * w])
            .swap_dims(1, 2);                               // [b, n, c]
        let ctx = self.mha.forward(MhaInput::self_attn(seq)).context;
        ctx.swap_dims(1, 2).reshape([b, c, h, w]) + x
    }
}

// ─── Resample ─────────────────────────────────────────────────────────────────

/// Changes channels and, for `factor` 2, halves (down) or doubles (up) the resolution.
#[derive(Module, Debug)]
pub struct Resample<B: Backend> {
    pub conv:     Conv2d<B>,
    pub upsample: usize,
}

impl<B: Backend> Resample<B> {
    /// Stride-2 3x3 conv, or a plain 3x3 conv when `factor == 1`.
    pub fn down(dim_in: usize, dim_out: usize, factor: usize, device: &B::Device) -> Self {
        Self { conv: conv3x3([dim_in, dim_out], factor, device), upsample: 1 }
    }

    /// Nearest-neighbour upsampling by `factor` followed by a 3x3 conv.
    pub fn up(dim_in: usize, dim_out: usize, factor: usize, device: &B::Device) -> Self {
        Self { conv: conv3x3([dim_in, dim_out], 1, device), upsample: factor }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = if self.upsample > 1 {
            let [_, _, h, w] = x.dims();
            interpolate(
                x,
                [h * self.upsample, w * self.upsample],
                InterpolateOptions::new(InterpolateMode::Nearest),
            )
        } else {
            x
        };
        self.conv.forward(x)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_timestep_embedding() {
        let device = Default::default();
        let t   = Tensor::<TestBackend, 1>::from_floats([0.0, 10.5], &device);
        let emb = timestep_embedding(t, 8);
        assert_eq!(emb.dims(), [2, 8]);
        // t = 0 → sin part 0, cos part 1
        let row = emb.slice([0..1, 0..8]).into_data().to_vec::<f32>().unwrap();
        assert_eq!(&row[..4], &[0.0; 4]);
        assert_eq!(&row[4..], &[1.0; 4]);
    }

    #[test]
    fn test_resnet_block_changes_channels() {
        let device = Default::default();
        let block  = ResnetBlock::<TestBackend>::new(8, 16, 12, 4, 0.0, &device);
        let x      = Tensor::random([2, 8, 4, 4], Distribution::Normal(0.0, 1.0), &device);
        let t      = Tensor::random([2, 12], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(x, t).dims(), [2, 16, 4, 4]);
    }

    #[test]
    fn test_attention_blocks_keep_shape() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([2, 8, 3, 5], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(LinearAttention::new(8, 2, 4, &device).forward(x.clone()).dims(), [2, 8, 3, 5]);
        assert_eq!(Attention::new(8, 2, &device).forward(x).dims(), [2, 8, 3, 5]);
    }

    #[test]
    fn test_resample_resolution() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::zeros([1, 4, 8, 8], &device);
        assert_eq!(Resample::down(4, 6, 2, &device).forward(x.clone()).dims(), [1, 6, 4, 4]);
        assert_eq!(Resample::down(4, 6, 1, &device).forward(x.clone()).dims(), [1, 6, 8, 8]);
        assert_eq!(Resample::up(4, 2, 2, &device).forward(x).dims(), [1, 2, 16, 16]);
    }
}
