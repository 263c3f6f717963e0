// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Step-based DDPM training with Adam, warmup/decay schedule and an
// EMA shadow model.
//
// Per step:
//   batch [0,1] ─► split across ranks ─► x0 = 2x - 1
//     each rank: t ~ U[0,T), ε ~ N(0,I), loss = mean(training_losses)
//                backward of loss · shard/batch
//   rank 0: gradients moved to the main device and accumulated
//           global grad-norm clip 1.0 ─► Adam step ─► scheduler step
//           EMA ← decay · EMA + (1 - decay) · model
//
// Every `samples_per_steps` steps:
//   sample grid PNG ─► checkpoint ─► IS/FID of model and of EMA
//
// Key Burn insight:
//   - Training runs on Autodiff<B>; model.valid() is the same
//     network on B with the same ParamIds, which the EMA and the
//     samplers use.
//   - Gradients from replicas forked to other devices are brought
//     back with GradientsParams::to_device before accumulating.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam, Ho et al. (2020)

use anyhow::{anyhow, Result};
use burn::{
    backend::Autodiff,
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::ImageDataset,
    infinite::{FullBatches, InfiniteLoader},
};
use crate::diffusion::{sampler::{randn, DiffusionSampler}, trainer::DdpmTrainer};
use crate::domain::average_meter::AverageMeter;
use crate::infra::{
    checkpoint::CheckpointManager,
    image_grid::save_grid,
    interrupt::Interrupt,
    metrics::{EvalRow, MetricsLogger, TrainRow},
    world::World,
};
use crate::ml::{
    ema::ema,
    evaluator::{generate_images, Evaluator, Weights},
    grad_clip::clip_grad_norm,
    lr_schedule::LinearWarmup,
    unet::Unet,
};
use crate::scoring::InceptionScorer;

const LR_FLOOR: f64 = 0.05;
const GRAD_CLIP_NORM: f64 = 1.0;

fn batch_len<B: Backend>(batch: &ImageBatch<B>) -> usize {
    batch.images.dims()[0]
}

/// Everything one rank needs for its part of a step.
struct Shard<B: Backend> {
    replica: Unet<Autodiff<B>>,
    images:  Option<Tensor<B, 4>>,
    rng:     StdRng,
}

struct ShardOutput {
    grads:    Option<GradientsParams>,
    loss_sum: f64,
    rng:      StdRng,
}

/// Forward and backward of one batch across the world. Returns gradients
/// on the main device and the batch-mean loss.
fn step_gradients<B: Backend>(
    world:  &World<B>,
    model:  &Unet<Autodiff<B>>,
    ddpm:   &DdpmTrainer,
    images: Tensor<B, 4>,
    rngs:   &mut Vec<StdRng>,
) -> Result<(GradientsParams, f64)> {
    let total    = images.dims()[0];
    let per_rank = world.per_rank(total);

    let shards: Vec<Shard<B>> = world
        .devices()
        .iter()
        .zip(std::mem::take(rngs))
        .enumerate()
        .map(|(rank, (device, rng))| {
            let lo = (rank * per_rank).min(total);
            let hi = ((rank + 1) * per_rank).min(total);
            let images  = (hi > lo).then(|| images.clone().slice([lo..hi]).to_device(device));
            let replica = if rank == 0 { model.clone() } else { model.clone().fork(device) };
            Shard { replica, images, rng }
        })
        .collect();

    let outputs = world.run(shards, |_rank, device, shard| {
        let Shard { replica, images, mut rng } = shard;
        let Some(images) = images else {
            return Ok(ShardOutput { grads: None, loss_sum: 0.0, rng });
        };

        let n       = images.dims()[0];
        let x_start = Tensor::<Autodiff<B>, 4>::from_inner(images).mul_scalar(2.0).sub_scalar(1.0);
        let t       = ddpm.sample_timesteps(n, &mut rng);
        let noise   = randn::<Autodiff<B>>(x_start.dims(), device);

        let loss = ddpm.training_losses(&replica, x_start, &t, noise).mean();
        let loss_value: f64 = loss.clone().into_scalar().elem();

        // shard-weighted so the accumulated gradient is the full-batch mean
        let grads = loss.mul_scalar(n as f64 / total as f64).backward();
        let grads = GradientsParams::from_grads(grads, &replica);
        Ok(ShardOutput { grads: Some(grads), loss_sum: loss_value * n as f64, rng })
    })?;

    let mut accumulator = GradientsAccumulator::new();
    let mut loss_sum    = 0.0;
    for out in outputs {
        rngs.push(out.rng);
        loss_sum += out.loss_sum;
        if let Some(grads) = out.grads {
            accumulator.accumulate(model, grads.to_device(world.main_device(), model));
        }
    }
    Ok((accumulator.grads(), loss_sum / total as f64))
}

/// What happens every `samples_per_steps` steps.
struct Milestone<'a, B: Backend> {
    cfg:        &'a TrainConfig,
    world:      &'a World<B>,
    sampler:    &'a DiffusionSampler,
    ckpt:       &'a CheckpointManager,
    evaluator:  Option<Evaluator<'a, B>>,
    eval_log:   MetricsLogger<EvalRow>,
    image_dims: [usize; 3],
}

impl<'a, B: Backend> Milestone<'a, B> {
    fn run(&self, model: &Unet<B>, model_ema: &Unet<B>, step: usize) -> Result<()> {
        let samples = generate_images(
            self.world,
            model,
            self.sampler,
            self.cfg.n_samples,
            self.cfg.run.batch_size,
            self.image_dims,
        )?;
        save_grid(&samples, &self.cfg.run.sample_dir().join(format!("{step:06}.png")))?;

        self.ckpt.save(model, model_ema, step)?;

        if let Some(evaluator) = &self.evaluator {
            evaluator.evaluate_and_log(model, Weights::Model, step, Some(&self.eval_log))?;
            evaluator.evaluate_and_log(model_ema, Weights::Ema, step, Some(&self.eval_log))?;
        }
        Ok(())
    }
}

pub fn run_training<B: Backend>(
    cfg:       &TrainConfig,
    world:     &World<B>,
    dataset:   ImageDataset,
    ckpt:      &CheckpointManager,
    scorer:    Option<&InceptionScorer<B>>,
    interrupt: &Interrupt,
) -> Result<()> {
    let device     = world.main_device().clone();
    let image_dims = dataset.image_shape().ok_or_else(|| anyhow!("training set is empty"))?;
    let batch_size = cfg.run.batch_size;

    // ── Build model and its EMA copy ──────────────────────────────────────────
    let mut model: Unet<Autodiff<B>> = cfg.model.init(&device);
    let mut model_ema: Unet<B> = model.valid();
    println!("Model Params: {:.2}M", model.num_params() as f64 / 1e6);

    let mut start_step = 0;
    if cfg.resume && ckpt.has_checkpoint() {
        let (m, e, step) = ckpt.load(model, cfg.model.init::<Autodiff<B>>(&device), &device)?;
        model      = m;
        model_ema  = e.valid();
        start_step = step;
        tracing::info!("Resuming from step {}", start_step);
    }
    if start_step >= cfg.n_steps {
        tracing::warn!("Checkpoint is at step {} >= n_steps {}, nothing to do", start_step, cfg.n_steps);
        return Ok(());
    }

    // ── Optimiser and schedule ────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
    let mut sched = LinearWarmup::new(cfg.lr, cfg.warmup, cfg.n_steps, LR_FLOOR).starting_at(start_step);

    // ── Diffusion ─────────────────────────────────────────────────────────────
    let diffusion = cfg.run.diffusion();
    let ddpm      = DdpmTrainer::new(diffusion.clone(), cfg.run.loss_type);
    let sampler   = DiffusionSampler::new(diffusion, cfg.run.sampler_settings());
    tracing::info!(
        "{:?} sampler, {} network evaluations per sample",
        cfg.run.sampler,
        sampler.num_evaluations()
    );

    // ── Data ──────────────────────────────────────────────────────────────────
    let data_seed = cfg.run.seed.wrapping_add(start_step as u64);
    let loader = DataLoaderBuilder::new(ImageBatcher::<B>::train(device.clone(), data_seed))
        .batch_size(batch_size)
        .shuffle(data_seed)
        .num_workers(cfg.num_workers.max(1))
        .build(dataset);
    let source = FullBatches { inner: loader, batch_size, size_of: batch_len::<B> };

    // ── Outputs ───────────────────────────────────────────────────────────────
    let train_log = MetricsLogger::<TrainRow>::new(cfg.run.output_dir())?;
    let milestone = Milestone {
        cfg,
        world,
        sampler:   &sampler,
        ckpt,
        evaluator: scorer.map(|scorer| Evaluator {
            world,
            sampler: &sampler,
            scorer,
            n_samples:  cfg.run.n_samples_eval,
            batch_size,
            image_dims,
        }),
        eval_log: MetricsLogger::<EvalRow>::new(cfg.run.output_dir())?,
        image_dims,
    };

    let bar = ProgressBar::new(cfg.n_steps as u64);
    bar.set_style(ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?);
    bar.set_position(start_step as u64);

    // ── Step loop ─────────────────────────────────────────────────────────────
    let mut rngs   = world.rank_rngs(cfg.run.seed.wrapping_add(start_step as u64));
    let mut meter  = AverageMeter::new();
    let mut window = AverageMeter::new();
    let mut step   = start_step;
    let mut saved_at = start_step;

    for batch in InfiniteLoader::new(&source, Some(cfg.n_steps - start_step)) {
        step += 1;
        let lr = sched.lr();

        let (grads, loss) = step_gradients(world, &model, &ddpm, batch.images, &mut rngs)?;
        let (grads, grad_norm) = clip_grad_norm(&model, grads, GRAD_CLIP_NORM);
        tracing::trace!("step {} grad norm {:.4}", step, grad_norm);
        model = optim.step(lr, model, grads);
        sched.step();
        model_ema = ema(&model.valid(), model_ema, cfg.ema_decay);

        meter.update(loss, batch_size);
        window.update(loss, batch_size);
        bar.set_message(format!("loss: {:.4}", meter.get()));
        bar.inc(1);

        if cfg.log_every > 0 && step % cfg.log_every == 0 {
            train_log.log(&TrainRow { step, loss: window.get(), lr })?;
            window.reset();
        }

        if cfg.samples_per_steps > 0 && step % cfg.samples_per_steps == 0 {
            bar.suspend(|| milestone.run(&model.valid(), &model_ema, step))?;
            saved_at = step;
        }

        if interrupt.is_raised() {
            bar.abandon_with_message(format!("interrupted at step {step}"));
            if saved_at != step {
                ckpt.save(&model.valid(), &model_ema, step)?;
            }
            return Ok(());
        }
    }
    bar.finish();

    if step < cfg.n_steps {
        tracing::warn!(
            "Data ran out after {} steps: the training set holds no full batch of {}",
            step,
            batch_size
        );
    }
    if saved_at != step {
        ckpt.save(&model.valid(), &model_ema, step)?;
    }
    tracing::info!("Training finished at step {}", step);
    Ok(())
}
