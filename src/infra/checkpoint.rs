// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// Files in the checkpoint directory:
//
//   checkpoints/
//     retina_weights.mpk.gz   ← best weights so far (overwritten)
//     run.json                ← config, class map, best epoch
//     metrics.csv             ← written by MetricsLogger
//
// The weights name is configured once and used by both the
// trainer (save) and the evaluator (load), so evaluation
// always reads the snapshot that training wrote.
//
// CompactRecorder stores half precision MessagePack, gzipped.
// Loading into a model of a different architecture fails.

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::domain::sample::ClassMap;
use crate::ml::model::RetinaNet;

/// File extension CompactRecorder appends to the weights path.
pub const WEIGHTS_EXTENSION: &str = "mpk.gz";

const MANIFEST_FILE: &str = "run.json";

/// Everything needed to rebuild a trained run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub config:        TrainConfig,
    pub classes:       ClassMap,
    pub best_epoch:    Option<usize>,
    pub best_val_loss: Option<f64>,
}

impl RunManifest {
    pub fn new(config: TrainConfig, classes: ClassMap) -> Self {
        Self {
            config,
            classes,
            best_epoch: None,
            best_val_loss: None,
        }
    }
}

#[derive(Debug)]
pub struct CheckpointManager {
    dir:          PathBuf,
    weights_name: String,
}

impl CheckpointManager {
    /// Creates the directory if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>, weights_name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self {
            dir,
            weights_name: weights_name.into(),
        })
    }

    /// Open an existing checkpoint directory without creating anything.
    pub fn open(dir: impl Into<PathBuf>, weights_name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            bail!(
                "Checkpoint directory '{}' does not exist. Run 'train' first.",
                dir.display()
            );
        }
        Ok(Self {
            dir,
            weights_name: weights_name.into(),
        })
    }

    /// Open a trained run: read run.json and use the weights name recorded there.
    pub fn from_manifest(dir: impl Into<PathBuf>) -> Result<(Self, RunManifest)> {
        let dir      = dir.into();
        let manifest = Self::open(dir.clone(), String::new())?.load_manifest()?;
        if manifest.classes.is_empty() {
            bail!("Manifest in '{}' lists no classes", dir.display());
        }
        let ckpt = Self::open(dir, manifest.config.weights_name.clone())?;
        Ok((ckpt, manifest))
    }

    /// Path handed to the recorder (no extension).
    fn weights_stem(&self) -> PathBuf {
        self.dir.join(&self.weights_name)
    }

    /// Path of the weights file on disk.
    pub fn weights_file(&self) -> PathBuf {
        self.dir.join(format!("{}.{WEIGHTS_EXTENSION}", self.weights_name))
    }

    pub fn has_weights(&self) -> bool {
        self.weights_file().is_file()
    }

    /// Write `model` as the best snapshot, replacing any previous one.
    pub fn save_weights<B: Backend>(&self, model: &RetinaNet<B>) -> Result<()> {
        let path = self.weights_stem();
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved weights to '{}'", self.weights_file().display());
        Ok(())
    }

    /// Restore the snapshot into `model`, which must have the same architecture.
    pub fn load_weights<B: Backend>(&self, model: RetinaNet<B>, device: &B::Device) -> Result<RetinaNet<B>> {
        let file = self.weights_file();
        if !self.has_weights() {
            bail!(
                "Checkpoint '{}' not found. Train the model first or check --weights-name.",
                file.display()
            );
        }

        let record = CompactRecorder::new()
            .load(self.weights_stem(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", file.display()))?;

        tracing::info!("Loaded weights from '{}'", file.display());
        Ok(model.load_record(record))
    }

    pub fn save_manifest(&self, manifest: &RunManifest) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest)?;
        fs::write(&path, json).with_context(|| format!("Cannot write manifest to '{}'", path.display()))?;
        tracing::debug!("Saved run manifest to '{}'", path.display());
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<RunManifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read '{}'. Make sure you have run 'train' before evaluating.",
                path.display()
            )
        })?;
        serde_json::from_str(&json).with_context(|| format!("Malformed manifest '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::RetinaNetConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_manifest_round_trip() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path().join("ckpt"), "retina_weights").unwrap();
        let mut manifest = RunManifest::new(
            TrainConfig::default(),
            ClassMap::from_names(vec!["Mild".to_string(), "Severe".to_string()]),
        );
        manifest.best_epoch = Some(3);

        ckpt.save_manifest(&manifest).unwrap();
        let loaded = ckpt.load_manifest().unwrap();
        assert_eq!(loaded.classes, manifest.classes);
        assert_eq!(loaded.best_epoch, Some(3));
        assert_eq!(loaded.config.image_size, manifest.config.image_size);
    }

    #[test]
    fn test_missing_weights_is_a_clear_error() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path(), "absent").unwrap();
        let device = Default::default();
        let model: RetinaNet<TestBackend> = RetinaNetConfig::new().with_image_size(64).init(&device).unwrap();

        let err = ckpt.load_weights(model, &device).unwrap_err();
        assert!(err.to_string().contains("absent.mpk.gz"), "{err}");
    }

    #[test]
    fn test_save_then_load_uses_one_path() {
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path(), "retina_weights").unwrap();
        let device = Default::default();
        let cfg    = RetinaNetConfig::new().with_image_size(64).with_num_classes(2);
        let model: RetinaNet<TestBackend> = cfg.init(&device).unwrap();

        ckpt.save_weights(&model).unwrap();
        assert!(ckpt.has_weights());
        assert_eq!(ckpt.weights_file(), tmp.path().join("retina_weights.mpk.gz"));

        let fresh: RetinaNet<TestBackend> = cfg.init(&device).unwrap();
        let restored = ckpt.load_weights(fresh, &device).unwrap();
        assert_eq!(restored.num_params(), model.num_params());
    }

    #[test]
    fn test_from_manifest_uses_recorded_weights_name() {
        let tmp  = tempfile::tempdir().unwrap();
        let cfg  = TrainConfig { weights_name: "custom".to_string(), ..TrainConfig::default() };
        let ckpt = CheckpointManager::new(tmp.path(), "custom").unwrap();
        ckpt.save_manifest(&RunManifest::new(cfg, ClassMap::from_names(vec!["A".to_string()])))
            .unwrap();

        let (reopened, manifest) = CheckpointManager::from_manifest(tmp.path()).unwrap();
        assert_eq!(manifest.config.weights_name, "custom");
        assert_eq!(reopened.weights_file(), tmp.path().join("custom.mpk.gz"));
    }

    #[test]
    fn test_manifest_without_classes_is_rejected() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path(), "retina_weights").unwrap();
        ckpt.save_manifest(&RunManifest::new(TrainConfig::default(), ClassMap::from_names(Vec::new())))
            .unwrap();

        let err = CheckpointManager::from_manifest(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no classes"), "{err}");
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::open(tmp.path().join("none"), "w").is_err());
    }
}
