// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Loads the best checkpoint of a run and returns the class
// probabilities for a single image.

use anyhow::{anyhow, Result};
use burn::prelude::*;
use std::path::PathBuf;

use crate::application::backend::{ndarray_device, wgpu_device, BackendKind, NdArrayBackend, WgpuBackend};
use crate::domain::{evaluation::argmax, sample::ClassMap};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Inferencer;

/// Probabilities for one image, in class index order.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub image:         PathBuf,
    pub classes:       ClassMap,
    pub probabilities: Vec<f32>,
    pub predicted:     usize,
}

pub struct PredictUseCase {
    checkpoint_dir: String,
    backend:        BackendKind,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: String, backend: BackendKind) -> Self {
        Self { checkpoint_dir, backend }
    }

    pub fn predict(&self, image: PathBuf) -> Result<Prediction> {
        match self.backend {
            BackendKind::Wgpu => self.run::<WgpuBackend>(image, wgpu_device()),
            BackendKind::NdArray => self.run::<NdArrayBackend>(image, ndarray_device()),
        }
    }

    fn run<B: Backend>(&self, image: PathBuf, device: B::Device) -> Result<Prediction> {
        let (ckpt, manifest) = CheckpointManager::from_manifest(&self.checkpoint_dir)?;
        let inferencer       = Inferencer::<B>::from_checkpoint(&ckpt, &manifest, device)?;

        let probabilities = inferencer.probabilities(&image)?;
        let predicted     = argmax(&probabilities).ok_or_else(|| anyhow!("Model produced no class scores"))?;
        tracing::debug!("'{}' → class {predicted}", image.display());

        Ok(Prediction {
            image,
            classes: manifest.classes,
            probabilities,
            predicted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::infra::checkpoint::RunManifest;
    use crate::ml::model::RetinaNetConfig;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_prediction_from_saved_run() {
        let tmp      = tempfile::tempdir().unwrap();
        let ckpt_dir = tmp.path().join("ckpt");
        let cfg = TrainConfig {
            checkpoint_dir: ckpt_dir.display().to_string(),
            image_size:     64,
            ..TrainConfig::default()
        };
        let classes = ClassMap::from_names(["Mild", "Moderate", "No_DR"].map(String::from));

        let ckpt = CheckpointManager::new(&ckpt_dir, &cfg.weights_name).unwrap();
        ckpt.save_manifest(&RunManifest::new(cfg, classes)).unwrap();
        let model = RetinaNetConfig::new()
            .with_image_size(64)
            .with_num_classes(3)
            .init::<NdArrayBackend>(&ndarray_device())
            .unwrap();
        ckpt.save_weights(&model).unwrap();

        let image = tmp.path().join("eye.jpg");
        RgbImage::from_pixel(90, 90, Rgb([180, 60, 20])).save(&image).unwrap();

        let prediction = PredictUseCase::new(ckpt_dir.display().to_string(), BackendKind::NdArray)
            .predict(image)
            .unwrap();

        assert_eq!(prediction.probabilities.len(), 3);
        assert_eq!(prediction.classes.len(), 3);
        let best = prediction.probabilities[prediction.predicted];
        assert!(prediction.probabilities.iter().all(|p| *p <= best));
    }

    #[test]
    fn test_missing_run_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let use_case = PredictUseCase::new(tmp.path().display().to_string(), BackendKind::NdArray);
        assert!(use_case.predict(tmp.path().join("eye.png")).is_err());
    }
}
