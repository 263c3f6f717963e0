// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a diffusion experiment:
// the knobs it is configured with, the running loss average,
// and the host-side image buffers passed between workers.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs and enums
//
// Reference: Rust Book §5 (Structs), §6 (Enums)

// Running average of scalar values
pub mod average_meter;

// Host-side image batches [n, c, h, w] in [0, 1]
pub mod image_set;

// Parameterisation, loss, sampler and backend choices
pub mod options;
