// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Burn specific code: the network, the training loop and the
// evaluation passes. The shape bookkeeping for the network
// lives in domain::topology so it can be checked without a
// backend.
//
//   model.rs      — Residual CNN built from a NetworkSpec:
//                   7×7 stem, three stages of one projection
//                   unit + two identity units, global average
//                   pooling, dense softmax head
//
//   monitor.rs    — Best validation loss tracking, used for
//                   checkpointing and early stopping
//
//   trainer.rs    — The epoch loop (forward, cross-entropy,
//                   backward, Adam step, validation)
//
//   evaluator.rs  — Batched and per-sample test evaluation
//
//   inferencer.rs — Loads a checkpoint and scores single images
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            He et al. (2016) Deep Residual Learning

/// Residual CNN classifier
pub mod model;

/// Validation loss monitor (best checkpoint + early stopping)
pub mod monitor;

/// Training loop with validation and checkpointing
pub mod trainer;

/// Batched and per-sample evaluation
pub mod evaluator;

/// Inference engine — loads checkpoint and predicts a class
pub mod inferencer;
