// ============================================================
// Layer 7 — FID Inception-v3
// ============================================================
// The Inception-v3 variant used for FID (TF-slim port): the same
// stem and Mixed_* blocks as torchvision, with average pools that
// exclude padding and a max pool in the last block's pool branch.
//
//   images [b,3,h,w] in [0,1]
//     → bilinear resize 299x299 → 2x - 1
//     → Conv2d_1a .. Conv2d_4a, two 3x3/2 max pools   [b,192,35,35]
//     → Mixed_5b,5c,5d (A)                            [b,288,35,35]
//     → Mixed_6a (B)                                  [b,768,17,17]
//     → Mixed_6b..6e (C)                              [b,768,17,17]
//     → Mixed_7a (D)                                  [b,1280,8,8]
//     → Mixed_7b,7c (E)                               [b,2048,8,8]
//     → global average pool                 pool      [b,2048]
//     → fc                                  logits    [b,1008]
//
// Each BasicConv is conv (no bias) + BatchNorm(eps 1e-3) + ReLU.
// The batch norms are folded into the conv at load time:
//   scale = γ / sqrt(var + eps),  w' = w · scale,  b' = β - mean · scale
//
// Reference: Szegedy et al. (2016), mseitzer/pytorch-fid

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::relu,
        module::{adaptive_avg_pool2d, avg_pool2d, interpolate, max_pool2d},
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::scoring::weights::{WeightStore, WeightsError};

pub const INPUT_SIZE: usize = 299;
pub const FEATURE_DIM: usize = 2048;
pub const NUM_LOGITS: usize = 1008;
const BN_EPS: f32 = 1e-3;

// ─── Construction ─────────────────────────────────────────────────────────────

/// Builds layers either randomly initialised or from a weight store.
pub(crate) struct Builder<'a, B: Backend> {
    store:  Option<&'a WeightStore>,
    device: &'a B::Device,
}

impl<'a, B: Backend> Builder<'a, B> {
    pub(crate) fn new(store: Option<&'a WeightStore>, device: &'a B::Device) -> Self {
        Self { store, device }
    }

    fn param<const D: usize>(&self, data: Vec<f32>, shape: [usize; D]) -> Param<Tensor<B, D>> {
        Param::from_tensor(Tensor::from_data(TensorData::new(data, shape), self.device))
    }

    /// `name` is the module path, e.g. `Mixed_5b.branch1x1`.
    fn conv(
        &self,
        name:    &str,
        cin:     usize,
        cout:    usize,
        kernel:  [usize; 2],
        stride:  usize,
        padding: [usize; 2],
    ) -> Result<BasicConv<B>, WeightsError> {
        let mut conv = Conv2dConfig::new([cin, cout], kernel)
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding[0], padding[1]))
            .init(self.device);

        if let Some(store) = self.store {
            let shape = [cout, cin, kernel[0], kernel[1]];
            let (w, b) = fold_batch_norm(store, name, &shape)?;
            conv.weight = self.param(w, shape);
            conv.bias   = Some(self.param(b, [cout]));
        }
        Ok(BasicConv { conv })
    }

    fn fc(&self, din: usize, dout: usize) -> Result<Linear<B>, WeightsError> {
        let mut fc = LinearConfig::new(din, dout).init(self.device);
        if let Some(store) = self.store {
            // torch stores [out, in]; burn's Linear expects [in, out]
            let w = store.get_shaped("fc.weight", &[dout, din])?;
            let mut t = vec![0.0; din * dout];
            for o in 0..dout {
                for i in 0..din {
                    t[i * dout + o] = w.data[o * din + i];
                }
            }
            let b = store.get_shaped("fc.bias", &[dout])?;
            fc.weight = self.param(t, [din, dout]);
            fc.bias   = Some(self.param(b.data.clone(), [dout]));
        }
        Ok(fc)
    }
}

/// Fold `{name}.bn.*` into `{name}.conv.weight`. Returns (weight, bias).
pub(crate) fn fold_batch_norm(
    store: &WeightStore,
    name:  &str,
    shape: &[usize; 4],
) -> Result<(Vec<f32>, Vec<f32>), WeightsError> {
    let cout = shape[0];
    let w     = store.get_shaped(&format!("{name}.conv.weight"), shape)?;
    let gamma = store.get_shaped(&format!("{name}.bn.weight"), &[cout])?;
    let beta  = store.get_shaped(&format!("{name}.bn.bias"), &[cout])?;
    let mean  = store.get_shaped(&format!("{name}.bn.running_mean"), &[cout])?;
    let var   = store.get_shaped(&format!("{name}.bn.running_var"), &[cout])?;

    let per_out = w.data.len() / cout;
    let mut weight = w.data.clone();
    let mut bias   = Vec::with_capacity(cout);
    for o in 0..cout {
        let scale = gamma.data[o] / (var.data[o] + BN_EPS).sqrt();
        for v in &mut weight[o * per_out..(o + 1) * per_out] {
            *v *= scale;
        }
        bias.push(beta.data[o] - mean.data[o] * scale);
    }
    Ok((weight, bias))
}

// ─── Layers ───────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct BasicConv<B: Backend> {
    pub conv: Conv2d<B>,
}

impl<B: Backend> BasicConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }
}

fn avg_pool_3x3<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    avg_pool2d(x, [3, 3], [1, 1], [1, 1], false)
}

fn max_pool_3x3<B: Backend>(x: Tensor<B, 4>, stride: usize, padding: usize) -> Tensor<B, 4> {
    max_pool2d(x, [3, 3], [stride, stride], [padding, padding], [1, 1])
}

/// 35x35 block: 1x1 | 5x5 | double 3x3 | avg pool.
#[derive(Module, Debug)]
pub struct InceptionA<B: Backend> {
    branch1x1:      BasicConv<B>,
    branch5x5_1:    BasicConv<B>,
    branch5x5_2:    BasicConv<B>,
    branch3x3dbl_1: BasicConv<B>,
    branch3x3dbl_2: BasicConv<B>,
    branch3x3dbl_3: BasicConv<B>,
    branch_pool:    BasicConv<B>,
}

impl<B: Backend> InceptionA<B> {
    pub(crate) fn build(b: &Builder<B>, name: &str, cin: usize, pool: usize) -> Result<Self, WeightsError> {
        let n = |s: &str| format!("{name}.{s}");
        Ok(Self {
            branch1x1:      b.conv(&n("branch1x1"), cin, 64, [1, 1], 1, [0, 0])?,
            branch5x5_1:    b.conv(&n("branch5x5_1"), cin, 48, [1, 1], 1, [0, 0])?,
            branch5x5_2:    b.conv(&n("branch5x5_2"), 48, 64, [5, 5], 1, [2, 2])?,
            branch3x3dbl_1: b.conv(&n("branch3x3dbl_1"), cin, 64, [1, 1], 1, [0, 0])?,
            branch3x3dbl_2: b.conv(&n("branch3x3dbl_2"), 64, 96, [3, 3], 1, [1, 1])?,
            branch3x3dbl_3: b.conv(&n("branch3x3dbl_3"), 96, 96, [3, 3], 1, [1, 1])?,
            branch_pool:    b.conv(&n("branch_pool"), cin, pool, [1, 1], 1, [0, 0])?,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());
        let b5 = self.branch5x5_2.forward(self.branch5x5_1.forward(x.clone()));
        let b3 = self.branch3x3dbl_1.forward(x.clone());
        let b3 = self.branch3x3dbl_3.forward(self.branch3x3dbl_2.forward(b3));
        let bp = self.branch_pool.forward(avg_pool_3x3(x));
        Tensor::cat(vec![b1, b5, b3, bp], 1)
    }
}

/// 35 → 17 grid reduction.
#[derive(Module, Debug)]
pub struct InceptionB<B: Backend> {
    branch3x3:      BasicConv<B>,
    branch3x3dbl_1: BasicConv<B>,
    branch3x3dbl_2: BasicConv<B>,
    branch3x3dbl_3: BasicConv<B>,
}

impl<B: Backend> InceptionB<B> {
    pub(crate) fn build(b: &Builder<B>, name: &str, cin: usize) -> Result<Self, WeightsError> {
        let n = |s: &str| format!("{name}.{s}");
        Ok(Self {
            branch3x3:      b.conv(&n("branch3x3"), cin, 384, [3, 3], 2, [0, 0])?,
            branch3x3dbl_1: b.conv(&n("branch3x3dbl_1"), cin, 64, [1, 1], 1, [0, 0])?,
            branch3x3dbl_2: b.conv(&n("branch3x3dbl_2"), 64, 96, [3, 3], 1, [1, 1])?,
            branch3x3dbl_3: b.conv(&n("branch3x3dbl_3"), 96, 96, [3, 3], 2, [0, 0])?,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3.forward(x.clone());
        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_3.forward(self.branch3x3dbl_2.forward(bd));
        let bp = max_pool_3x3(x, 2, 0);
        Tensor::cat(vec![b3, bd, bp], 1)
    }
}

/// 17x17 block with factorised 7x7 convolutions of width `c7`.
#[derive(Module, Debug)]
pub struct InceptionC<B: Backend> {
    branch1x1:      BasicConv<B>,
    branch7x7_1:    BasicConv<B>,
    branch7x7_2:    BasicConv<B>,
    branch7x7_3:    BasicConv<B>,
    branch7x7dbl_1: BasicConv<B>,
    branch7x7dbl_2: BasicConv<B>,
    branch7x7dbl_3: BasicConv<B>,
    branch7x7dbl_4: BasicConv<B>,
    branch7x7dbl_5: BasicConv<B>,
    branch_pool:    BasicConv<B>,
}

impl<B: Backend> InceptionC<B> {
    pub(crate) fn build(b: &Builder<B>, name: &str, cin: usize, c7: usize) -> Result<Self, WeightsError> {
        let n = |s: &str| format!("{name}.{s}");
        let (row, col) = ([1, 7], [7, 1]);
        let (prow, pcol) = ([0, 3], [3, 0]);
        Ok(Self {
            branch1x1:      b.conv(&n("branch1x1"), cin, 192, [1, 1], 1, [0, 0])?,
            branch7x7_1:    b.conv(&n("branch7x7_1"), cin, c7, [1, 1], 1, [0, 0])?,
            branch7x7_2:    b.conv(&n("branch7x7_2"), c7, c7, row, 1, prow)?,
            branch7x7_3:    b.conv(&n("branch7x7_3"), c7, 192, col, 1, pcol)?,
            branch7x7dbl_1: b.conv(&n("branch7x7dbl_1"), cin, c7, [1, 1], 1, [0, 0])?,
            branch7x7dbl_2: b.conv(&n("branch7x7dbl_2"), c7, c7, col, 1, pcol)?,
            branch7x7dbl_3: b.conv(&n("branch7x7dbl_3"), c7, c7, row, 1, prow)?,
            branch7x7dbl_4: b.conv(&n("branch7x7dbl_4"), c7, c7, col, 1, pcol)?,
            branch7x7dbl_5: b.conv(&n("branch7x7dbl_5"), c7, 192, row, 1, prow)?,
            branch_pool:    b.conv(&n("branch_pool"), cin, 192, [1, 1], 1, [0, 0])?,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b7 = self.branch7x7_1.forward(x.clone());
        let b7 = self.branch7x7_3.forward(self.branch7x7_2.forward(b7));

        let bd = self.branch7x7dbl_1.forward(x.clone());
        let bd = self.branch7x7dbl_2.forward(bd);
        let bd = self.branch7x7dbl_3.forward(bd);
        let bd = self.branch7x7dbl_4.forward(bd);
        let bd = self.branch7x7dbl_5.forward(bd);

        let bp = self.branch_pool.forward(avg_pool_3x3(x));
        Tensor::cat(vec![b1, b7, bd, bp], 1)
    }
}

/// 17 → 8 grid reduction.
#[derive(Module, Debug)]
pub struct InceptionD<B: Backend> {
    branch3x3_1:   BasicConv<B>,
    branch3x3_2:   BasicConv<B>,
    branch7x7x3_1: BasicConv<B>,
    branch7x7x3_2: BasicConv<B>,
    branch7x7x3_3: BasicConv<B>,
    branch7x7x3_4: BasicConv<B>,
}

impl<B: Backend> InceptionD<B> {
    pub(crate) fn build(b: &Builder<B>, name: &str, cin: usize) -> Result<Self, WeightsError> {
        let n = |s: &str| format!("{name}.{s}");
        Ok(Self {
            branch3x3_1:   b.conv(&n("branch3x3_1"), cin, 192, [1, 1], 1, [0, 0])?,
            branch3x3_2:   b.conv(&n("branch3x3_2"), 192, 320, [3, 3], 2, [0, 0])?,
            branch7x7x3_1: b.conv(&n("branch7x7x3_1"), cin, 192, [1, 1], 1, [0, 0])?,
            branch7x7x3_2: b.conv(&n("branch7x7x3_2"), 192, 192, [1, 7], 1, [0, 3])?,
            branch7x7x3_3: b.conv(&n("branch7x7x3_3"), 192, 192, [7, 1], 1, [3, 0])?,
            branch7x7x3_4: b.conv(&n("branch7x7x3_4"), 192, 192, [3, 3], 2, [0, 0])?,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3_2.forward(self.branch3x3_1.forward(x.clone()));
        let b7 = self.branch7x7x3_1.forward(x.clone());
        let b7 = self.branch7x7x3_2.forward(b7);
        let b7 = self.branch7x7x3_3.forward(b7);
        let b7 = self.branch7x7x3_4.forward(b7);
        let bp = max_pool_3x3(x, 2, 0);
        Tensor::cat(vec![b3, b7, bp], 1)
    }
}

/// 8x8 block with split 1x3 / 3x1 heads. `max_pool` selects the pool
/// branch of the final block.
#[derive(Module, Debug)]
pub struct InceptionE<B: Backend> {
    branch1x1:       BasicConv<B>,
    branch3x3_1:     BasicConv<B>,
    branch3x3_2a:    BasicConv<B>,
    branch3x3_2b:    BasicConv<B>,
    branch3x3dbl_1:  BasicConv<B>,
    branch3x3dbl_2:  BasicConv<B>,
    branch3x3dbl_3a: BasicConv<B>,
    branch3x3dbl_3b: BasicConv<B>,
    branch_pool:     BasicConv<B>,
    max_pool:        bool,
}

impl<B: Backend> InceptionE<B> {
    pub(crate) fn build(b: &Builder<B>, name: &str, cin: usize, max_pool: bool) -> Result<Self, WeightsError> {
        let n = |s: &str| format!("{name}.{s}");
        Ok(Self {
            branch1x1:       b.conv(&n("branch1x1"), cin, 320, [1, 1], 1, [0, 0])?,
            branch3x3_1:     b.conv(&n("branch3x3_1"), cin, 384, [1, 1], 1, [0, 0])?,
            branch3x3_2a:    b.conv(&n("branch3x3_2a"), 384, 384, [1, 3], 1, [0, 1])?,
            branch3x3_2b:    b.conv(&n("branch3x3_2b"), 384, 384, [3, 1], 1, [1, 0])?,
            branch3x3dbl_1:  b.conv(&n("branch3x3dbl_1"), cin, 448, [1, 1], 1, [0, 0])?,
            branch3x3dbl_2:  b.conv(&n("branch3x3dbl_2"), 448, 384, [3, 3], 1, [1, 1])?,
            branch3x3dbl_3a: b.conv(&n("branch3x3dbl_3a"), 384, 384, [1, 3], 1, [0, 1])?,
            branch3x3dbl_3b: b.conv(&n("branch3x3dbl_3b"), 384, 384, [3, 1], 1, [1, 0])?,
            branch_pool:     b.conv(&n("branch_pool"), cin, 192, [1, 1], 1, [0, 0])?,
            max_pool,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());

        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = Tensor::cat(
            vec![self.branch3x3_2a.forward(b3.clone()), self.branch3x3_2b.forward(b3)],
            1,
        );

        let bd = self.branch3x3dbl_1.forward(x.clone());
        let bd = self.branch3x3dbl_2.forward(bd);
        let bd = Tensor::cat(
            vec![self.branch3x3dbl_3a.forward(bd.clone()), self.branch3x3dbl_3b.forward(bd)],
            1,
        );

        let pooled = if self.max_pool { max_pool_3x3(x, 1, 1) } else { avg_pool_3x3(x) };
        let bp = self.branch_pool.forward(pooled);
        Tensor::cat(vec![b1, b3, bd, bp], 1)
    }
}

// ─── Network ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InceptionOutput<B: Backend> {
    /// [b, 2048] pool features (FID)
    pub pool:   Tensor<B, 2>,
    /// [b, 1008] class logits (Inception Score)
    pub logits: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct InceptionV3<B: Backend> {
    conv2d_1a: BasicConv<B>,
    conv2d_2a: BasicConv<B>,
    conv2d_2b: BasicConv<B>,
    conv2d_3b: BasicConv<B>,
    conv2d_4a: BasicConv<B>,
    mixed_5b:  InceptionA<B>,
    mixed_5c:  InceptionA<B>,
    mixed_5d:  InceptionA<B>,
    mixed_6a:  InceptionB<B>,
    mixed_6b:  InceptionC<B>,
    mixed_6c:  InceptionC<B>,
    mixed_6d:  InceptionC<B>,
    mixed_6e:  InceptionC<B>,
    mixed_7a:  InceptionD<B>,
    mixed_7b:  InceptionE<B>,
    mixed_7c:  InceptionE<B>,
    fc:        Linear<B>,
}

impl<B: Backend> InceptionV3<B> {
    /// Load the FID weights (pytorch-fid parameter names) from a safetensors file.
    pub fn load(store: &WeightStore, device: &B::Device) -> Result<Self, WeightsError> {
        Self::build(&Builder::new(Some(store), device))
    }

    pub(crate) fn build(b: &Builder<B>) -> Result<Self, WeightsError> {
        Ok(Self {
            conv2d_1a: b.conv("Conv2d_1a_3x3", 3, 32, [3, 3], 2, [0, 0])?,
            conv2d_2a: b.conv("Conv2d_2a_3x3", 32, 32, [3, 3], 1, [0, 0])?,
            conv2d_2b: b.conv("Conv2d_2b_3x3", 32, 64, [3, 3], 1, [1, 1])?,
            conv2d_3b: b.conv("Conv2d_3b_1x1", 64, 80, [1, 1], 1, [0, 0])?,
            conv2d_4a: b.conv("Conv2d_4a_3x3", 80, 192, [3, 3], 1, [0, 0])?,
            mixed_5b:  InceptionA::build(b, "Mixed_5b", 192, 32)?,
            mixed_5c:  InceptionA::build(b, "Mixed_5c", 256, 64)?,
            mixed_5d:  InceptionA::build(b, "Mixed_5d", 288, 64)?,
            mixed_6a:  InceptionB::build(b, "Mixed_6a", 288)?,
            mixed_6b:  InceptionC::build(b, "Mixed_6b", 768, 128)?,
            mixed_6c:  InceptionC::build(b, "Mixed_6c", 768, 160)?,
            mixed_6d:  InceptionC::build(b, "Mixed_6d", 768, 160)?,
            mixed_6e:  InceptionC::build(b, "Mixed_6e", 768, 192)?,
            mixed_7a:  InceptionD::build(b, "Mixed_7a", 768)?,
            mixed_7b:  InceptionE::build(b, "Mixed_7b", 1280, false)?,
            mixed_7c:  InceptionE::build(b, "Mixed_7c", 2048, true)?,
            fc:        b.fc(FEATURE_DIM, NUM_LOGITS)?,
        })
    }

    /// images: [b, 3, h, w] in [0, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> InceptionOutput<B> {
        let [b, _, h, w] = images.dims();
        let x = if h == INPUT_SIZE && w == INPUT_SIZE {
            images
        } else {
            interpolate(
                images,
                [INPUT_SIZE, INPUT_SIZE],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        };
        let x = x.mul_scalar(2.0).sub_scalar(1.0);

        let x = self.conv2d_1a.forward(x);
        let x = self.conv2d_2a.forward(x);
        let x = self.conv2d_2b.forward(x);
        let x = max_pool_3x3(x, 2, 0);
        let x = self.conv2d_3b.forward(x);
        let x = self.conv2d_4a.forward(x);
        let x = max_pool_3x3(x, 2, 0);

        let x = self.mixed_5b.forward(x);
        let x = self.mixed_5c.forward(x);
        let x = self.mixed_5d.forward(x);
        let x = self.mixed_6a.forward(x);
        let x = self.mixed_6b.forward(x);
        let x = self.mixed_6c.forward(x);
        let x = self.mixed_6d.forward(x);
        let x = self.mixed_6e.forward(x);
        let x = self.mixed_7a.forward(x);
        let x = self.mixed_7b.forward(x);
        let x = self.mixed_7c.forward(x);

        let pool   = adaptive_avg_pool2d(x, [1, 1]).reshape([b, FEATURE_DIM]);
        let logits = self.fc.forward(pool.clone());
        InceptionOutput { pool, logits }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::weights::HostTensor;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn bn_store(name: &str, weight: Vec<f32>, gamma: Vec<f32>, beta: Vec<f32>, var: Vec<f32>) -> WeightStore {
        let cout = gamma.len();
        let mut store = WeightStore::default();
        store.insert(format!("{name}.conv.weight"), HostTensor::new(vec![cout, 1, 1, 1], weight));
        store.insert(format!("{name}.bn.weight"), HostTensor::new(vec![cout], gamma));
        store.insert(format!("{name}.bn.bias"), HostTensor::new(vec![cout], beta));
        store.insert(format!("{name}.bn.running_mean"), HostTensor::new(vec![cout], vec![0.0; cout]));
        store.insert(format!("{name}.bn.running_var"), HostTensor::new(vec![cout], var));
        store
    }

    #[test]
    fn test_batch_norm_folding() {
        // scale = [1, 0.5] → w' = [1, 1], b' = [0.5, -10]
        let store = bn_store(
            "stem",
            vec![1.0, 2.0],
            vec![1.0, 1.0],
            vec![0.5, -10.0],
            vec![1.0 - BN_EPS, 4.0 - BN_EPS],
        );
        let device  = Default::default();
        let builder = Builder::<TestBackend>::new(Some(&store), &device);
        let conv    = builder.conv("stem", 1, 2, [1, 1], 1, [0, 0]).unwrap();

        let x   = Tensor::<TestBackend, 4>::ones([1, 1, 1, 1], &device);
        let out = conv.forward(x).into_data().to_vec::<f32>().unwrap();
        assert!((out[0] - 1.5).abs() < 1e-5);
        // relu clips the negative channel
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_missing_weights_are_reported() {
        let store  = WeightStore::default();
        let device = Default::default();
        let err = InceptionV3::<TestBackend>::load(&store, &device).unwrap_err();
        assert!(matches!(err, WeightsError::TensorNotFound(name) if name == "Conv2d_1a_3x3.conv.weight"));
    }

    #[test]
    fn test_block_widths() {
        let device = Default::default();
        let b = Builder::<TestBackend>::new(None, &device);

        let a = InceptionA::build(&b, "a", 192, 32).unwrap();
        assert_eq!(a.forward(Tensor::zeros([1, 192, 5, 5], &device)).dims(), [1, 256, 5, 5]);

        let red = InceptionB::build(&b, "b", 288).unwrap();
        assert_eq!(red.forward(Tensor::zeros([1, 288, 7, 7], &device)).dims(), [1, 768, 3, 3]);

        let e = InceptionE::build(&b, "e", 1280, true).unwrap();
        assert_eq!(e.forward(Tensor::zeros([1, 1280, 3, 3], &device)).dims(), [1, 2048, 3, 3]);
    }
}
