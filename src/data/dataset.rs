use burn::data::dataset::Dataset;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;

use crate::data::preprocessor::{Augmentation, ImagePreprocessor};
use crate::domain::sample::{ClassMap, Sample};

/// One decoded image with its class index.
/// `image` is `[3, size, size]` floats in [0, 1].
#[derive(Debug, Clone)]
pub struct RetinaItem {
    pub image: Vec<f32>,
    pub label: usize,
}

/// Lazily decodes images as the data loader asks for them.
///
/// A file that fails to decode is logged and yields `None`, which ends the
/// loader's current pass early; the pass then fails in `ensure_complete`.
/// `verify_readable` decodes every file up front, so this only happens
/// when an image changes on disk mid-run.
pub struct RetinaDataset {
    samples:      Vec<(Sample, usize)>,
    preprocessor: ImagePreprocessor,
    augmentation: Option<Augmentation>,
    rng:          Mutex<ChaCha8Rng>,
}

impl RetinaDataset {
    /// Samples whose label is missing from `classes` are dropped with a warning.
    pub fn new(samples: Vec<Sample>, classes: &ClassMap, preprocessor: ImagePreprocessor) -> Self {
        let samples = samples
            .into_iter()
            .filter_map(|s| match classes.index_of(&s.label) {
                Some(idx) => Some((s, idx)),
                None => {
                    tracing::warn!("Dropping '{}': unknown class '{}'", s.path.display(), s.label);
                    None
                }
            })
            .collect();

        Self {
            samples,
            preprocessor,
            augmentation: None,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(0)),
        }
    }

    /// Enable random training distortions, drawn from a stream seeded with `seed`.
    pub fn with_augmentation(mut self, augmentation: Augmentation, seed: u64) -> Self {
        self.augmentation = Some(augmentation);
        self.rng = Mutex::new(ChaCha8Rng::seed_from_u64(seed));
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Dataset<RetinaItem> for RetinaDataset {
    fn get(&self, index: usize) -> Option<RetinaItem> {
        let (sample, label) = self.samples.get(index)?;

        let image = match &self.augmentation {
            Some(aug) => {
                // A poisoned lock only means another worker panicked mid-draw
                let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
                self.preprocessor.load_augmented(&sample.path, aug, &mut *rng)
            }
            None => self.preprocessor.load(&sample.path),
        };

        match image {
            Ok(image) => Some(RetinaItem { image, label: *label }),
            Err(e) => {
                tracing::error!("Skipping sample: {e:#}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
