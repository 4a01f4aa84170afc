// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer depends on these traits rather than
// on the concrete directory indexer or the Burn learner, so
// the epoch loop and its stopping rules can be driven by a
// scripted learner in tests.

use anyhow::Result;

use crate::domain::{evaluation::EvalSummary, sample::Sample};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Anything that can enumerate labelled images.
///
/// Implementations:
///   - DirectoryIndexer → one sub-directory per class
pub trait SampleSource {
    fn load_samples(&self) -> Result<Vec<Sample>>;
}

// ─── EpochLearner ─────────────────────────────────────────────────────────────
/// One model + optimiser pair that the epoch loop drives.
///
/// Implementations:
///   - BurnLearner → the residual network on a Burn backend
pub trait EpochLearner {
    /// Run one optimisation pass over the training data.
    fn train_epoch(&mut self, epoch: usize) -> Result<EvalSummary>;

    /// Measure the current weights on the validation data.
    fn validate(&self, epoch: usize) -> Result<EvalSummary>;

    /// Persist the current weights as the best snapshot, replacing any previous one.
    fn save_best(&self, epoch: usize) -> Result<()>;
}
