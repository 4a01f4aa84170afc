// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the class folders on disk to backend-ready
// tensor batches.
//
//   train/<Class>/*.png
//       │
//       ▼
//   DirectoryIndexer  → (path, label) samples
//       │
//       ▼
//   DatasetSplit      → seeded train / validation / test
//       │
//       ▼
//   ImagePreprocessor → decode, resize, [0,1], optional shear/flip
//       │
//       ▼
//   RetinaDataset     → implements Burn's Dataset trait
//       │
//       ▼
//   RetinaBatcher     → stacks items into [N, 3, H, W] tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop

/// Enumerates class folders into labelled samples
pub mod indexer;

/// Seeded shuffle and train/validation/test partitioning
pub mod splitter;

/// Image decoding, resizing, normalisation and augmentation
pub mod preprocessor;

/// Implements Burn's Dataset trait for fundus images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
