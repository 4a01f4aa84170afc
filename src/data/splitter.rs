// ============================================================
// Layer 4 — Train/Validation/Test Splitter
// ============================================================
// Shuffles the indexed samples with a seeded RNG, holds out a
// test portion, then carves a validation portion out of what
// is left:
//
//   all samples ──shuffle──► 80% train+val │ 20% test
//                             └─► 85% train │ 15% validation
//
// The RNG is passed in rather than taken from the thread, so
// the same seed always yields the same three sets. Evaluation
// relies on that to rebuild the test set of a training run.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom and
// ChaCha8 for a portable, seedable stream.

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::indexer::DatasetError;

/// Shuffle `samples` with `rng` and split into (first, second), where
/// `first` holds `round(len * first_fraction)` items.
pub fn split_with_rng<T, R: Rng + ?Sized>(
    mut samples: Vec<T>,
    first_fraction: f64,
    rng: &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * first_fraction).round() as usize;
    let split_at = split_at.min(total);

    // split_off(n) leaves [0..n) in `samples` and returns [n..)
    let second = samples.split_off(split_at);
    (samples, second)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of all samples held out for the final test
    pub test_fraction:       f64,
    /// Fraction of the remaining samples used for validation
    pub validation_fraction: f64,
    pub seed:                u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction:       0.2,
            validation_fraction: 0.15,
            seed:                42,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), DatasetError> {
        for f in [self.test_fraction, self.validation_fraction] {
            if !(f > 0.0 && f < 1.0) {
                return Err(DatasetError::InvalidFraction(f));
            }
        }
        Ok(())
    }
}

/// The three disjoint sample sets of one run.
#[derive(Debug, Clone)]
pub struct DatasetSplit<T> {
    pub train:      Vec<T>,
    pub validation: Vec<T>,
    pub test:       Vec<T>,
}

impl<T> DatasetSplit<T> {
    pub fn new(samples: Vec<T>, cfg: &SplitConfig) -> Result<Self, DatasetError> {
        cfg.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);

        let (train_val, test)   = split_with_rng(samples, 1.0 - cfg.test_fraction, &mut rng);
        let (train, validation) = split_with_rng(train_val, 1.0 - cfg.validation_fraction, &mut rng);

        tracing::debug!(
            "Dataset split: {} train, {} validation, {} test",
            train.len(),
            validation.len(),
            test.len()
        );
        Ok(Self { train, validation, test })
    }

    /// Refuse to go on with a split that left a set empty.
    pub fn ensure_non_empty(&self) -> Result<(), DatasetError> {
        if self.train.is_empty() {
            return Err(DatasetError::EmptySplit("training"));
        }
        if self.validation.is_empty() {
            return Err(DatasetError::EmptySplit("validation"));
        }
        if self.test.is_empty() {
            return Err(DatasetError::EmptySplit("test"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_correct_split_sizes() {
        let mut rng      = ChaCha8Rng::seed_from_u64(1);
        let items        = (0..100).collect::<Vec<usize>>();
        let (train, val) = split_with_rng(items, 0.8, &mut rng);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(), 20);
    }

    #[test]
    fn test_three_way_split_is_exhaustive_and_disjoint() {
        for (n, test_f, val_f) in [(100, 0.2, 0.15), (10, 0.2, 0.15), (37, 0.5, 0.5), (1000, 0.01, 0.99)] {
            let cfg = SplitConfig { test_fraction: test_f, validation_fraction: val_f, seed: 7 };
            let split = DatasetSplit::new((0..n).collect::<Vec<usize>>(), &cfg).unwrap();

            let mut seen = HashSet::new();
            for x in split.train.iter().chain(&split.validation).chain(&split.test) {
                assert!(seen.insert(*x), "duplicate {x}");
            }
            assert_eq!(seen.len(), n);
            assert_eq!(split.len(), n);
        }
    }

    #[test]
    fn test_default_ratios_on_ten_samples() {
        let split = DatasetSplit::new((0..10).collect::<Vec<usize>>(), &SplitConfig::default()).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.validation.len(), 1);
        assert_eq!(split.train.len(), 7);
        assert!(split.ensure_non_empty().is_ok());
    }

    #[test]
    fn test_same_seed_same_split() {
        let cfg = SplitConfig::default();
        let a = DatasetSplit::new((0..50).collect::<Vec<usize>>(), &cfg).unwrap();
        let b = DatasetSplit::new((0..50).collect::<Vec<usize>>(), &cfg).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_different_seed_different_order() {
        let a = DatasetSplit::new((0..50).collect::<Vec<usize>>(), &SplitConfig { seed: 1, ..SplitConfig::default() }).unwrap();
        let b = DatasetSplit::new((0..50).collect::<Vec<usize>>(), &SplitConfig { seed: 2, ..SplitConfig::default() }).unwrap();
        assert_ne!(a.train, b.train);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let cfg = SplitConfig { test_fraction: 1.0, ..SplitConfig::default() };
        assert!(matches!(
            DatasetSplit::new(vec![1, 2, 3], &cfg),
            Err(DatasetError::InvalidFraction(_))
        ));
    }

    #[test]
    fn test_empty_split_detected() {
        let split = DatasetSplit::new(vec![1usize, 2], &SplitConfig::default()).unwrap();
        assert!(matches!(split.ensure_non_empty(), Err(DatasetError::EmptySplit(_))));
    }

    #[test]
    fn test_empty_dataset() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let (train, val) = split_with_rng(Vec::<usize>::new(), 0.8, &mut rng);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }
}
