// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the CIFAR-10 files on disk and the tensor
// batches consumed by the training loop:
//
//   cifar-10-batches-bin/*.bin
//       │
//       ▼
//   Cifar10           → parses 3073-byte records into ImageItems
//       │
//       ▼
//   ImageDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher      → [batch, 3, 32, 32] floats in [0, 1], random flips
//       │
//       ▼
//   DataLoader        → shuffled batches, one pass per epoch
//       │
//       ▼
//   InfiniteLoader    → restarts passes until the step budget is spent
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// CIFAR-10 binary format reader
pub mod cifar;

/// Implements Burn's Dataset trait for images
pub mod dataset;

/// Implements Burn's Batcher trait to create image tensors
pub mod batcher;

/// Step-budgeted cycling over a re-iterable batch source
pub mod infinite;
