// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop with validation, best-checkpoint saving and early
// stopping.
//
//   fit()        — backend-free driver. Each epoch: train,
//                  validate, ask the ValLossMonitor whether the
//                  validation loss improved (save weights) and
//                  whether patience ran out (stop).
//
//   BurnLearner  — the real EpochLearner: Adam over an
//                  autodiff backend, cross-entropy loss,
//                  validation on the inner backend via
//                  model.valid(). A pass that covers fewer
//                  images than its split holds is an error.
//
// Burn notes:
//   - Training uses B: AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - The validation batcher must also use B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{RetinaBatch, RetinaBatcher},
    dataset::RetinaDataset,
    preprocessor::ImagePreprocessor,
    splitter::DatasetSplit,
};
use crate::domain::{
    evaluation::{BatchTally, EvalSummary},
    sample::{ClassMap, Sample},
    traits::EpochLearner,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    evaluator::{count_correct, ensure_complete, evaluate_batches},
    model::RetinaNet,
    monitor::ValLossMonitor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    pub max_epochs: usize,
    pub patience:   usize,
}

#[derive(Debug, Clone)]
pub struct FitReport {
    pub history:        Vec<EpochMetrics>,
    pub best_epoch:     Option<usize>,
    pub best_val_loss:  Option<f64>,
    pub stopped_early:  bool,
}

impl FitReport {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }
}

/// Run up to `max_epochs` epochs, saving on every strict improvement of
/// the validation loss and stopping once `patience` epochs pass without one.
pub fn fit<L: EpochLearner>(
    learner: &mut L,
    opts: FitOptions,
    logger: Option<&MetricsLogger>,
) -> Result<FitReport> {
    let mut monitor       = ValLossMonitor::new(opts.patience);
    let mut history       = Vec::with_capacity(opts.max_epochs);
    let mut stopped_early = false;

    for epoch in 1..=opts.max_epochs {
        let train = learner.train_epoch(epoch)?;
        let val   = learner.validate(epoch)?;

        let verdict = monitor.observe(epoch, val.loss);
        if verdict.improved {
            learner.save_best(epoch)?;
            tracing::info!("Epoch {epoch}: val_loss improved to {:.4}, weights saved", val.loss);
        } else {
            tracing::info!(
                "Epoch {epoch}: val_loss {:.4} did not improve ({}/{} epochs without improvement)",
                val.loss,
                monitor.stale_epochs(),
                opts.patience,
            );
        }

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}%{}",
            epoch,
            opts.max_epochs,
            train.loss,
            train.accuracy * 100.0,
            val.loss,
            val.accuracy * 100.0,
            if verdict.improved { " | saved" } else { "" },
        );

        let metrics = EpochMetrics::new(epoch, &train, &val, verdict.improved);
        if let Some(logger) = logger {
            logger.log(&metrics)?;
        }
        history.push(metrics);

        if verdict.stop {
            stopped_early = true;
            tracing::info!(
                "Early stopping after epoch {epoch}; best epoch was {:?}",
                monitor.best_epoch()
            );
            break;
        }
    }

    Ok(FitReport {
        history,
        best_epoch: monitor.best_epoch(),
        best_val_loss: monitor.best(),
        stopped_early,
    })
}

// ─── BurnLearner ──────────────────────────────────────────────────────────────
pub struct BurnLearner<'a, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<RetinaNet<B>, B>,
{
    model:        RetinaNet<B>,
    optim:        O,
    lr:           f64,
    train_loader: Arc<dyn DataLoader<RetinaBatch<B>>>,
    valid_loader: Arc<dyn DataLoader<RetinaBatch<B::InnerBackend>>>,
    train_len:    usize,
    valid_len:    usize,
    checkpoints:  &'a CheckpointManager,
}

impl<'a, B, O> BurnLearner<'a, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<RetinaNet<B>, B>,
{
    /// `train_len` and `valid_len` are the image counts behind each loader.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: RetinaNet<B>,
        optim: O,
        lr: f64,
        train_loader: Arc<dyn DataLoader<RetinaBatch<B>>>,
        train_len: usize,
        valid_loader: Arc<dyn DataLoader<RetinaBatch<B::InnerBackend>>>,
        valid_len: usize,
        checkpoints: &'a CheckpointManager,
    ) -> Self {
        Self { model, optim, lr, train_loader, valid_loader, train_len, valid_len, checkpoints }
    }
}

impl<B, O> EpochLearner for BurnLearner<'_, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<RetinaNet<B>, B>,
{
    fn train_epoch(&mut self, epoch: usize) -> Result<EvalSummary> {
        let mut tally = BatchTally::new();

        for batch in self.train_loader.iter() {
            let batch_size = batch.targets.dims()[0];
            let logits     = self.model.forward_logits(batch.images);

            let ce   = CrossEntropyLossConfig::new().init(&logits.device());
            let loss = ce.forward(logits.clone(), batch.targets.clone());

            let batch_loss: f64 = loss.clone().into_scalar().elem::<f64>();
            tally.push(batch_loss, count_correct(logits, batch.targets), batch_size);

            // Backward pass + Adam update
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self.optim.step(self.lr, self.model.clone(), grads);
        }

        let summary = tally.finish();
        tracing::debug!("Epoch {epoch}: trained on {} samples", summary.samples);
        ensure_complete(&format!("Epoch {epoch} training"), &summary, self.train_len)?;
        Ok(summary)
    }

    fn validate(&self, epoch: usize) -> Result<EvalSummary> {
        // BatchNorm switches to its running statistics
        let model_valid = self.model.valid();
        let summary     = evaluate_batches(&model_valid, self.valid_loader.iter());
        tracing::debug!("Epoch {epoch}: validated on {} samples", summary.samples);
        ensure_complete(&format!("Epoch {epoch} validation"), &summary, self.valid_len)?;
        Ok(summary)
    }

    fn save_best(&self, _epoch: usize) -> Result<()> {
        self.checkpoints.save_weights(&self.model.valid())
    }
}

// ─── Wiring ───────────────────────────────────────────────────────────────────
/// Build model, optimiser and loaders for `split`, then run `fit`.
pub fn run_training<B: AutodiffBackend>(
    cfg:         &TrainConfig,
    classes:     &ClassMap,
    split:       &DatasetSplit<Sample>,
    checkpoints: &CheckpointManager,
    logger:      &MetricsLogger,
    device:      B::Device,
) -> Result<FitReport> {
    let model: RetinaNet<B> = cfg.model_config(classes.len()).init(&device)?;
    tracing::info!(
        "Model ready: {} residual units, {} parameters, {} classes",
        model.unit_count(),
        model.num_params(),
        classes.len()
    );

    // β1 0.9, β2 0.999, ε 1e-7
    let optim = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-7)
        .init::<B, RetinaNet<B>>();

    let preprocessor = ImagePreprocessor::new(cfg.image_size);

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_dataset = RetinaDataset::new(split.train.clone(), classes, preprocessor)
        .with_augmentation(cfg.augmentation(), cfg.seed);
    let train_len = train_dataset.sample_count();
    tracing::info!("Training on {train_len} images");

    let train_loader = DataLoaderBuilder::new(RetinaBatcher::<B>::new(device.clone(), cfg.image_size))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend, no autodiff overhead) ───────────
    // rescale only: distortions stay on the training split
    let val_dataset = RetinaDataset::new(split.validation.clone(), classes, preprocessor);
    let valid_len = val_dataset.sample_count();
    tracing::info!("Validating on {valid_len} images");

    let valid_loader = DataLoaderBuilder::new(RetinaBatcher::<B::InnerBackend>::new(device, cfg.image_size))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let mut learner = BurnLearner::new(
        model,
        optim,
        cfg.lr,
        train_loader,
        train_len,
        valid_loader,
        valid_len,
        checkpoints,
    );
    fit(
        &mut learner,
        FitOptions { max_epochs: cfg.epochs, patience: cfg.patience },
        Some(logger),
    )
}
