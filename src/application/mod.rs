// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each
// (train a run, score a run, compute reference statistics).
//
// Rules for this layer:
//   - No ML math or model code here
//   - Only workflow coordination and backend selection
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Settings shared by every command
pub mod run_config;

// The training workflow
pub mod train_use_case;

// Scoring a trained checkpoint
pub mod eval_use_case;

// Reference FID statistics of a dataset split
pub mod stats_use_case;
