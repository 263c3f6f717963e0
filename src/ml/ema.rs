// ============================================================
// Layer 5 — Exponential Moving Average of Weights
// ============================================================
//   ema_param ← decay * ema_param + (1 - decay) * param
//
// The live model and its EMA copy come from the same initialisation,
// so their parameters share ParamIds. One ModuleVisitor pass collects
// the live values by id, one ModuleMapper pass blends them into the
// EMA copy.
//
// Reference: Burn Book §8 (Module visitor / mapper)

use std::collections::HashMap;

use burn::{
    module::{ModuleMapper, ModuleVisitor, ParamId},
    prelude::*,
};

/// Collects every float parameter of a module, flattened, keyed by id.
struct ParamCollector<B: Backend> {
    params: HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector<B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        let n = tensor.shape().num_elements();
        self.params.insert(id, tensor.clone().reshape([n]));
    }
}

/// Blends collected live parameters into the module it maps.
struct EmaBlend<B: Backend> {
    live:    HashMap<ParamId, Tensor<B, 1>>,
    decay:   f64,
    missing: usize,
}

impl<B: Backend> ModuleMapper<B> for EmaBlend<B> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self.live.remove(&id) {
            Some(live) => {
                let shape = tensor.shape();
                let live  = live.reshape(shape).to_device(&tensor.device());
                tensor * self.decay + live * (1.0 - self.decay)
            }
            None => {
                self.missing += 1;
                tensor
            }
        }
    }
}

/// Move `ema_model` towards `model` in place of the old weights.
/// Returns the updated EMA model.
pub fn ema<B: Backend, M: Module<B>>(model: &M, ema_model: M, decay: f64) -> M {
    let mut collector = ParamCollector { params: HashMap::new() };
    model.visit(&mut collector);

    let mut blend = EmaBlend { live: collector.params, decay, missing: 0 };
    let updated = ema_model.map(&mut blend);
    if blend.missing > 0 {
        tracing::warn!("EMA update skipped {} parameters with no live counterpart", blend.missing);
    }
    updated
}
