// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence shared by training and evaluation:
//
//   checkpoint.rs  — Model weights via Burn's CompactRecorder,
//                    plus run.json (config, class map, best
//                    epoch) so evaluation can rebuild the same
//                    network and the same test split. Trainer
//                    and evaluator resolve the weights file
//                    from the same configured name.
//
//   metrics.rs     — One CSV row per epoch (loss/accuracy for
//                    both phases), the raw material for loss
//                    curves.
//
//   predictions.rs — Streams per-sample test predictions to a
//                    CSV as they are produced.

/// Model checkpoint and run manifest persistence
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Per-sample prediction CSV writer
pub mod predictions;
