// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits describing what the system
// works with: labelled fundus images, the network topology,
// and evaluation results.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Keeping the topology description here means the whole
// network can be shape-checked in a unit test without
// touching a tensor backend.

// A labelled image on disk and the class catalogue
pub mod sample;

// Declarative network description with shape inference
pub mod topology;

// Prediction records, confusion matrix, accuracy
pub mod evaluation;

// Core abstractions (traits) that other layers implement
pub mod traits;
