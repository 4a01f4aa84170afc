// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one user goal: train, evaluate, or predict.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No clap types here (the CLI converts its args first)
//   - Backend selection happens here, once per use case
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Backend choice and the concrete Burn backends behind it
pub mod backend;

// The training workflow
pub mod train_use_case;

// Test-split evaluation of a finished run
pub mod evaluate_use_case;

// Single image prediction
pub mod predict_use_case;

// Console text blocks
pub mod report;
