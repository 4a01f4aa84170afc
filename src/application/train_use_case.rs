// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Index class folders        (Layer 4 - data)
//   Step 2: Check every image header   (Layer 4 - data)
//   Step 3: Split train/val/test       (Layer 4 - data)
//   Step 4: Print the model summary    (Layer 3 - domain)
//   Step 5: Save the run manifest      (Layer 6 - infra)
//   Step 6: Run the training loop      (Layer 5 - ml)
//   Step 7: Evaluate the best weights  (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::application::{
    backend::{ndarray_device, wgpu_device, BackendKind, NdArrayTrainBackend, WgpuTrainBackend},
    evaluate_use_case::{evaluate_test_split, TestReport},
    report::print_overview,
};
use crate::data::{
    indexer::{verify_readable, DirectoryIndexer},
    preprocessor::Augmentation,
    splitter::{DatasetSplit, SplitConfig},
};
use crate::domain::{sample::ClassMap, traits::SampleSource};
use crate::infra::{
    checkpoint::{CheckpointManager, RunManifest},
    metrics::MetricsLogger,
};
use crate::ml::{
    model::RetinaNetConfig,
    trainer::{run_training, FitReport},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings of a training run.
// Saved to run.json so `evaluate` and `predict` can rebuild the same
// network and recreate the same test split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:            String,
    pub checkpoint_dir:      String,
    pub weights_name:        String,
    pub image_size:          usize,
    pub batch_size:          usize,
    pub epochs:              usize,
    pub patience:            usize,
    pub lr:                  f64,
    pub test_fraction:       f64,
    pub validation_fraction: f64,
    pub seed:                u64,
    pub init_seed:           u64,
    pub shear_degrees:       f32,
    pub horizontal_flip:     bool,
    pub num_workers:         usize,
    pub backend:             BackendKind,
    pub predictions_csv:     Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:            "train".to_string(),
            checkpoint_dir:      "checkpoints".to_string(),
            weights_name:        "retina_weights".to_string(),
            image_size:          256,
            batch_size:          32,
            epochs:              50,
            patience:            15,
            lr:                  1e-3,
            test_fraction:       0.2,
            validation_fraction: 0.15,
            seed:                42,
            init_seed:           0,
            shear_degrees:       0.2,
            horizontal_flip:     false,
            num_workers:         2,
            backend:             BackendKind::Wgpu,
            predictions_csv:     None,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self, num_classes: usize) -> RetinaNetConfig {
        RetinaNetConfig::new()
            .with_num_classes(num_classes)
            .with_image_size(self.image_size)
            .with_init_seed(self.init_seed)
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            test_fraction:       self.test_fraction,
            validation_fraction: self.validation_fraction,
            seed:                self.seed,
        }
    }

    pub fn augmentation(&self) -> Augmentation {
        Augmentation {
            shear_degrees:   self.shear_degrees,
            horizontal_flip: self.horizontal_flip,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if self.epochs == 0 {
            bail!("epochs must be at least 1");
        }
        if self.lr.is_nan() || self.lr <= 0.0 {
            bail!("learning rate must be positive, got {}", self.lr);
        }
        self.split_config().validate()?;
        Ok(())
    }
}

/// What a finished training run produced.
#[derive(Debug)]
pub struct TrainOutcome {
    pub fit:  FitReport,
    pub test: TestReport,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainOutcome> {
        self.config.validate()?;
        match self.config.backend {
            BackendKind::Wgpu => {
                let device = wgpu_device();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run::<WgpuTrainBackend>(device)
            }
            BackendKind::NdArray => {
                tracing::info!("Using NdArray CPU backend");
                self.run::<NdArrayTrainBackend>(ndarray_device())
            }
        }
    }

    fn run<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainOutcome> {
        let cfg = &self.config;

        // ── Step 1: Index class folders ───────────────────────────────────────
        tracing::info!("Indexing images under '{}'", cfg.data_dir);
        let samples = DirectoryIndexer::new(&cfg.data_dir).load_samples()?;
        let classes = ClassMap::from_samples(&samples);

        // ── Step 2: Fail fast on unreadable files ─────────────────────────────
        verify_readable(&samples)?;
        print_overview(&samples, &classes);

        // ── Step 3: Train / validation / test split ───────────────────────────
        let split = DatasetSplit::new(samples, &cfg.split_config())?;
        split.ensure_non_empty()?;
        tracing::info!(
            "Split: {} train, {} validation, {} test",
            split.train.len(),
            split.validation.len(),
            split.test.len()
        );

        // ── Step 4: Model summary ─────────────────────────────────────────────
        let spec = cfg.model_config(classes.len()).spec();
        println!("\n{}", spec.summary()?);

        // ── Step 5: Checkpoint directory, manifest and metrics file ──────────
        let ckpt   = CheckpointManager::new(&cfg.checkpoint_dir, &cfg.weights_name)?;
        let logger = MetricsLogger::create(&cfg.checkpoint_dir)?;
        let mut manifest = RunManifest::new(cfg.clone(), classes.clone());
        ckpt.save_manifest(&manifest)?;

        // ── Step 6: Training loop (Layer 5) ───────────────────────────────────
        let fit = run_training::<B>(cfg, &classes, &split, &ckpt, &logger, device.clone())?;
        manifest.best_epoch    = fit.best_epoch;
        manifest.best_val_loss = fit.best_val_loss;
        ckpt.save_manifest(&manifest)?;

        if fit.best_epoch.is_none() {
            bail!("No epoch produced a finite validation loss; nothing was saved");
        }

        // ── Step 7: Evaluate the best checkpoint on the test split ────────────
        let predictions_csv = cfg.predictions_csv.as_ref().map(PathBuf::from);
        let test = evaluate_test_split::<B::InnerBackend>(
            &manifest,
            &split.test,
            &ckpt,
            predictions_csv.as_deref(),
            device,
        )?;

        Ok(TrainOutcome { fit, test })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::indexer::tests::write_dataset;

    #[test]
    fn test_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.data_dir, "train");
        assert_eq!(cfg.image_size, 256);
        assert_eq!(cfg.epochs, 50);
        assert_eq!(cfg.patience, 15);
        assert_eq!(cfg.batch_size, 32);
        assert!((cfg.lr - 1e-3).abs() < 1e-12);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let zero_batch = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(zero_batch.validate().is_err());

        let bad_fraction = TrainConfig { test_fraction: 1.0, ..TrainConfig::default() };
        assert!(bad_fraction.validate().is_err());
    }

    #[test]
    fn test_missing_data_dir_fails_before_training() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            data_dir:       tmp.path().join("nope").display().to_string(),
            checkpoint_dir: tmp.path().join("ckpt").display().to_string(),
            backend:        BackendKind::NdArray,
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(err.to_string().contains("nope"), "{err}");
    }

    // Ten tiny images, two classes, one short run on the CPU backend.
    #[test]
    fn test_end_to_end_on_tiny_dataset() {
        let tmp  = tempfile::tempdir().unwrap();
        let data = tmp.path().join("train");
        write_dataset(&data, &["Mild", "No_DR"], 5, 72);

        let ckpt_dir = tmp.path().join("ckpt");
        let cfg = TrainConfig {
            data_dir:            data.display().to_string(),
            checkpoint_dir:      ckpt_dir.display().to_string(),
            image_size:          64,
            batch_size:          4,
            epochs:              2,
            patience:            2,
            test_fraction:       0.2,
            validation_fraction: 0.15,
            num_workers:         1,
            backend:             BackendKind::NdArray,
            predictions_csv:     Some(tmp.path().join("preds.csv").display().to_string()),
            ..TrainConfig::default()
        };

        let outcome = TrainUseCase::new(cfg).execute().unwrap();

        assert!(outcome.fit.epochs_run() >= 1 && outcome.fit.epochs_run() <= 2);
        assert!(outcome.fit.best_epoch.is_some());
        assert!(ckpt_dir.join("retina_weights.mpk.gz").is_file());
        assert!(ckpt_dir.join("run.json").is_file());
        assert_eq!(outcome.test.confusion.total(), 2);
        assert_eq!(outcome.test.classes.len(), 2);

        let preds = std::fs::read_to_string(tmp.path().join("preds.csv")).unwrap();
        assert_eq!(preds.lines().count(), 3);

        let metrics = std::fs::read_to_string(ckpt_dir.join("metrics.csv")).unwrap();
        assert_eq!(metrics.lines().count(), outcome.fit.epochs_run() + 1);
    }
}
