// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The denoising network and everything that trains or samples it:
//
//   blocks.rs      — time embedding, residual blocks, attention,
//                    up/down sampling
//   unet.rs        — the U-Net denoiser built from those blocks
//   ema.rs         — exponential moving average of weights
//   grad_clip.rs   — clipping by the global gradient norm
//   lr_schedule.rs — linear warmup then linear decay
//   trainer.rs     — step-based training loop across the world
//   evaluator.rs   — sample generation, IS/FID evaluation
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Ho et al. (2020) Denoising Diffusion Probabilistic Models

/// U-Net building blocks
pub mod blocks;

/// EMA of model weights
pub mod ema;

/// Global gradient norm clipping
pub mod grad_clip;

/// Sampling and IS/FID evaluation
pub mod evaluator;

/// Learning-rate warmup and decay
pub mod lr_schedule;

/// Training loop with periodic sampling, checkpointing and evaluation
pub mod trainer;

/// U-Net denoiser
pub mod unet;
