// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by training, evaluation and stats:
//
//   world.rs       — one worker per device, scatter/gather fan-out,
//                    backend → device mapping, RNG seeding
//
//   interrupt.rs   — Ctrl-C flag polled by the training loop
//
//   checkpoint.rs  — model + EMA record, latest step, run config
//
//   metrics.rs     — train/eval CSV logs
//
//   image_grid.rs  — sample grids written as PNG
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Sample grid PNG writer
pub mod image_grid;

/// Ctrl-C handling
pub mod interrupt;

/// Training and evaluation CSV loggers
pub mod metrics;

/// Devices, ranks and thread fan-out
pub mod world;
