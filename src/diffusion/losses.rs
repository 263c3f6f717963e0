//! Gaussian KL and discretized likelihood terms of the variational bound.

use std::f64::consts::PI;

use burn::prelude::*;

/// Mean over every dimension except the batch.
pub fn mean_flat<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 1> {
    let batch = x.dims()[0];
    x.flatten::<2>(1, 3).mean_dim(1).reshape([batch])
}

/// KL(N(mean1, exp(logvar1)) || N(mean2, exp(logvar2))), elementwise.
pub fn normal_kl<B: Backend>(
    mean1:   Tensor<B, 4>,
    logvar1: Tensor<B, 4>,
    mean2:   Tensor<B, 4>,
    logvar2: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let diff = mean1 - mean2;
    ((logvar2.clone() - logvar1.clone()) - 1.0
        + (logvar1 - logvar2.clone()).exp()
        + diff.clone() * diff * logvar2.neg().exp())
        * 0.5
}

/// Fast tanh approximation of the standard normal CDF.
pub fn approx_standard_normal_cdf<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let cubic = x.clone() * x.clone() * x.clone() * 0.044715;
    ((x + cubic) * (2.0 / PI).sqrt()).tanh().add_scalar(1.0) * 0.5
}

/// Log-likelihood of 8-bit data rescaled to [-1, 1] under a Gaussian,
/// integrated over each pixel's bin of width 2/255.
pub fn discretized_gaussian_log_likelihood<B: Backend>(
    x:          Tensor<B, 4>,
    means:      Tensor<B, 4>,
    log_scales: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let centered = x.clone() - means;
    let inv_stdv = log_scales.neg().exp();

    let cdf_plus = approx_standard_normal_cdf((centered.clone() + 1.0 / 255.0) * inv_stdv.clone());
    let cdf_min  = approx_standard_normal_cdf((centered - 1.0 / 255.0) * inv_stdv);

    let log_cdf_plus           = cdf_plus.clone().clamp_min(1e-12).log();
    let log_one_minus_cdf_min  = (cdf_min.clone().neg() + 1.0).clamp_min(1e-12).log();
    let log_cdf_delta          = (cdf_plus - cdf_min).clamp_min(1e-12).log();

    // edge bins extend to +-infinity
    log_cdf_delta
        .mask_where(x.clone().greater_elem(0.999), log_one_minus_cdf_min)
        .mask_where(x.lower_elem(-0.999), log_cdf_plus)
}
