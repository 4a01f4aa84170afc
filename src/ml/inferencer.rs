// ============================================================
// Layer 5 — Inferencer
// ============================================================
use anyhow::{anyhow, Result};
use burn::prelude::*;
use std::path::Path;

use crate::data::preprocessor::{ImagePreprocessor, CHANNELS};
use crate::domain::evaluation::argmax;
use crate::infra::checkpoint::{CheckpointManager, RunManifest};
use crate::ml::model::RetinaNet;

pub struct Inferencer<B: Backend> {
    model:        RetinaNet<B>,
    preprocessor: ImagePreprocessor,
    device:       B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: RetinaNet<B>, image_size: usize, device: B::Device) -> Self {
        Self {
            model,
            preprocessor: ImagePreprocessor::new(image_size),
            device,
        }
    }

    /// Rebuild the network described by the manifest and load its best weights.
    pub fn from_checkpoint(ckpt: &CheckpointManager, manifest: &RunManifest, device: B::Device) -> Result<Self> {
        let model_cfg = manifest.config.model_config(manifest.classes.len());
        let model: RetinaNet<B> = model_cfg.init(&device)?;
        let model = ckpt.load_weights(model, &device)?;

        Ok(Self::new(model, manifest.config.image_size, device))
    }

    pub fn model(&self) -> &RetinaNet<B> {
        &self.model
    }

    /// Softmax class probabilities for one image file.
    pub fn probabilities(&self, path: &Path) -> Result<Vec<f32>> {
        let side   = self.preprocessor.size;
        let pixels = self.preprocessor.load(path)?;

        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [1, CHANNELS, side, side]),
            &self.device,
        );

        self.model
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read model output: {e:?}"))
    }

    /// (class index, probability) of the most likely class.
    pub fn predict(&self, path: &Path) -> Result<(usize, f32)> {
        let probs = self.probabilities(path)?;
        let class = argmax(&probs).ok_or_else(|| anyhow!("Model produced no class scores"))?;
        Ok((class, probs[class]))
    }
}
