// ============================================================
// Layer 5 — Global Gradient Norm Clipping
// ============================================================
//   norm  = sqrt(Σ_params ‖g‖²)
//   scale = max_norm / (norm + 1e-6)   when that is below 1
//   g    ← g · scale                   for every parameter
//
// Adam's own clipping works one tensor at a time. Here the norm spans
// the whole model, so every gradient shrinks by the same factor.
// Gradients live on the inner backend, keyed by the module's ParamIds.

use burn::{
    module::{ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

const NORM_EPS: f64 = 1e-6;

struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    total: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(g) = self.grads.get::<B::InnerBackend, D>(id) {
            let sq: f64 = (g.clone() * g).sum().into_scalar().elem();
            self.total += sq;
        }
    }
}

struct Rescale<'a> {
    grads: &'a mut GradientsParams,
    scale: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(g) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, g.mul_scalar(self.scale));
        }
    }
}

/// Scale the gradients of `module` so their joint L2 norm is at most
/// `max_norm`. Returns the gradients and the norm before clipping.
pub fn clip_grad_norm<B: AutodiffBackend, M: Module<B>>(
    module:   &M,
    mut grads: GradientsParams,
    max_norm: f64,
) -> (GradientsParams, f64) {
    let mut norm = SquaredNorm { grads: &grads, total: 0.0 };
    module.visit(&mut norm);
    let total_norm = norm.total.sqrt();

    let scale = max_norm / (total_norm + NORM_EPS);
    if scale < 1.0 {
        module.visit(&mut Rescale { grads: &mut grads, scale });
    }
    (grads, total_norm)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = Autodiff<NdArray>;

    /// Weight gradient [0.6, 0.6] (norm 0.85) and bias gradient [0.7]:
    /// each is below 1, together they are 1.1.
    fn layer_and_grads(bias: f32) -> (Linear<TestBackend>, GradientsParams) {
        let device = Default::default();
        let layer: Linear<TestBackend> = LinearConfig::new(2, 1).init(&device);
        let mut grads = GradientsParams::new();
        grads.register::<NdArray, 2>(layer.weight.id, Tensor::from_floats([[0.6], [0.6]], &device));
        if let Some(b) = &layer.bias {
            grads.register::<NdArray, 1>(b.id, Tensor::from_floats([bias], &device));
        }
        (layer, grads)
    }

    fn values<const D: usize>(grads: &GradientsParams, id: ParamId) -> Vec<f32> {
        grads.get::<NdArray, D>(id).unwrap().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_joint_norm_is_clipped_even_when_each_tensor_is_small() {
        let (layer, grads) = layer_and_grads(0.7);
        let bias_id = layer.bias.as_ref().unwrap().id;

        let (grads, norm) = clip_grad_norm(&layer, grads, 1.0);
        assert!((norm - 1.1).abs() < 1e-5);

        let w = values::<2>(&grads, layer.weight.id);
        let b = values::<1>(&grads, bias_id);
        for v in &w {
            assert!((v - 0.6 / 1.1).abs() < 1e-5);
        }
        assert!((b[0] - 0.7 / 1.1).abs() < 1e-5);

        let clipped: f32 = w.iter().chain(&b).map(|v| v * v).sum::<f32>().sqrt();
        assert!((clipped - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_small_joint_norm_is_left_alone() {
        let (layer, grads) = layer_and_grads(0.1);
        let (grads, norm) = clip_grad_norm(&layer, grads, 1.0);
        assert!(norm < 1.0);
        assert_eq!(values::<2>(&grads, layer.weight.id), vec![0.6, 0.6]);
    }
}
