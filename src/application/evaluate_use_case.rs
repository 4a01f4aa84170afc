// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores the best checkpoint of a finished run on its test
// split:
//   1. Read run.json (config, class map, weights name)
//   2. Re-index the data directory and check the class folders
//      still match the trained classes
//   3. Recreate the test split from the recorded seed
//   4. Batched pass (loss + accuracy) and per-sample pass
//      (confusion matrix, optional predictions CSV)

use anyhow::{bail, Result};
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};
use std::path::{Path, PathBuf};

use crate::application::backend::{ndarray_device, wgpu_device, BackendKind, NdArrayBackend, WgpuBackend};
use crate::data::{
    batcher::RetinaBatcher,
    dataset::RetinaDataset,
    indexer::{verify_readable, DirectoryIndexer},
    preprocessor::ImagePreprocessor,
    splitter::DatasetSplit,
};
use crate::domain::{
    evaluation::{ConfusionMatrix, EvalSummary},
    sample::{ClassMap, Sample},
    traits::SampleSource,
};
use crate::infra::{
    checkpoint::{CheckpointManager, RunManifest},
    predictions::PredictionWriter,
};
use crate::ml::{
    evaluator::{collect_confusion, evaluate_batched, PredictionStream},
    inferencer::Inferencer,
};

/// Results of both evaluation passes over one test split.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub batched:   EvalSummary,
    pub confusion: ConfusionMatrix,
    pub classes:   ClassMap,
}

impl TestReport {
    pub fn per_sample_accuracy(&self) -> f64 {
        self.confusion.accuracy()
    }
}

/// Load the best weights and run the batched and per-sample passes over `test`.
pub fn evaluate_test_split<B: Backend>(
    manifest:        &RunManifest,
    test:            &[Sample],
    ckpt:            &CheckpointManager,
    predictions_csv: Option<&Path>,
    device:          B::Device,
) -> Result<TestReport> {
    let cfg     = &manifest.config;
    let classes = &manifest.classes;

    let inferencer = Inferencer::<B>::from_checkpoint(ckpt, manifest, device.clone())?;

    // ── Batched pass ──────────────────────────────────────────────────────────
    let dataset = RetinaDataset::new(test.to_vec(), classes, ImagePreprocessor::new(cfg.image_size));
    // single-threaded, so the first ⌊N / batch⌋ batches are full ones
    let loader  = DataLoaderBuilder::new(RetinaBatcher::<B>::new(device, cfg.image_size))
        .batch_size(cfg.batch_size)
        .build(dataset);
    let batched = evaluate_batched(inferencer.model(), loader.as_ref(), test.len(), cfg.batch_size)?;
    tracing::info!(
        "Batched test pass: loss={:.4} accuracy={:.4} over {} images",
        batched.loss,
        batched.accuracy,
        batched.samples
    );

    // ── Per-sample pass ───────────────────────────────────────────────────────
    let mut writer = predictions_csv.map(PredictionWriter::create).transpose()?;
    let stream     = PredictionStream::new(&inferencer, classes, test);
    let confusion  = collect_confusion(stream, classes.len(), |record| match writer.as_mut() {
        Some(w) => w.write(record, classes),
        None => Ok(()),
    })?;

    if let Some(w) = writer {
        w.finish()?;
        if let Some(path) = predictions_csv {
            tracing::info!("Wrote per-sample predictions to '{}'", path.display());
        }
    }

    Ok(TestReport {
        batched,
        confusion,
        classes: classes.clone(),
    })
}

pub struct EvaluateUseCase {
    checkpoint_dir:  String,
    data_dir:        Option<String>,
    backend:         BackendKind,
    predictions_csv: Option<String>,
}

impl EvaluateUseCase {
    /// `data_dir` overrides the directory recorded at training time.
    pub fn new(
        checkpoint_dir: String,
        data_dir: Option<String>,
        backend: BackendKind,
        predictions_csv: Option<String>,
    ) -> Self {
        Self { checkpoint_dir, data_dir, backend, predictions_csv }
    }

    pub fn execute(&self) -> Result<TestReport> {
        match self.backend {
            BackendKind::Wgpu => self.run::<WgpuBackend>(wgpu_device()),
            BackendKind::NdArray => self.run::<NdArrayBackend>(ndarray_device()),
        }
    }

    fn run<B: Backend>(&self, device: B::Device) -> Result<TestReport> {
        let (ckpt, manifest) = CheckpointManager::from_manifest(&self.checkpoint_dir)?;
        let test = self.recreate_test_split(&manifest)?;
        tracing::info!("Evaluating {} test images", test.len());

        let predictions_csv = self.predictions_csv.as_ref().map(PathBuf::from);
        evaluate_test_split::<B>(&manifest, &test, &ckpt, predictions_csv.as_deref(), device)
    }

    fn recreate_test_split(&self, manifest: &RunManifest) -> Result<Vec<Sample>> {
        let data_dir = self.data_dir.as_deref().unwrap_or(&manifest.config.data_dir);
        let samples  = DirectoryIndexer::new(data_dir).load_samples()?;

        let classes = ClassMap::from_samples(&samples);
        if classes != manifest.classes {
            bail!(
                "Class folders in '{}' ({}) differ from the trained classes ({})",
                data_dir,
                classes.names().join(", "),
                manifest.classes.names().join(", ")
            );
        }

        let split = DatasetSplit::new(samples, &manifest.config.split_config())?;
        split.ensure_non_empty()?;
        verify_readable(&split.test)?;
        Ok(split.test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::data::indexer::tests::write_dataset;
    use crate::ml::model::RetinaNetConfig;

    fn trained_run(root: &Path, classes: &[&str]) -> (CheckpointManager, RunManifest) {
        let data = root.join("train");
        write_dataset(&data, classes, 5, 64);

        let cfg = TrainConfig {
            data_dir:       data.display().to_string(),
            checkpoint_dir: root.join("ckpt").display().to_string(),
            image_size:     64,
            batch_size:     4,
            num_workers:    1,
            backend:        BackendKind::NdArray,
            ..TrainConfig::default()
        };
        let class_map = ClassMap::from_names(classes.iter().map(|c| c.to_string()));
        let manifest  = RunManifest::new(cfg.clone(), class_map);

        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir, &cfg.weights_name).unwrap();
        ckpt.save_manifest(&manifest).unwrap();

        let device = ndarray_device();
        let model  = RetinaNetConfig::new()
            .with_image_size(64)
            .with_num_classes(classes.len())
            .init::<NdArrayBackend>(&device)
            .unwrap();
        ckpt.save_weights(&model).unwrap();
        (ckpt, manifest)
    }

    #[test]
    fn test_evaluates_recorded_test_split() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, manifest) = trained_run(tmp.path(), &["Mild", "No_DR"]);

        let use_case = EvaluateUseCase::new(
            manifest.config.checkpoint_dir.clone(),
            None,
            BackendKind::NdArray,
            None,
        );
        let report = use_case.execute().unwrap();

        assert_eq!(report.confusion.total(), 2);
        assert_eq!(report.batched.samples, 2);
        let acc = report.per_sample_accuracy();
        assert!((0.0..=1.0).contains(&acc));
    }

    #[test]
    fn test_changed_class_folders_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, manifest) = trained_run(tmp.path(), &["Mild", "No_DR"]);
        write_dataset(&tmp.path().join("train"), &["Severe"], 2, 64);

        let use_case = EvaluateUseCase::new(
            manifest.config.checkpoint_dir.clone(),
            None,
            BackendKind::NdArray,
            None,
        );
        let err = use_case.execute().unwrap_err();
        assert!(err.to_string().contains("differ"), "{err}");
    }

    #[test]
    fn test_missing_checkpoint_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let use_case = EvaluateUseCase::new(
            tmp.path().join("none").display().to_string(),
            None,
            BackendKind::NdArray,
            None,
        );
        assert!(use_case.execute().is_err());
    }
}
