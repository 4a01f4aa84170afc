// ============================================================
// Layer 5 — Evaluation
// ============================================================
// Two ways of scoring a trained model on held-out images:
//
//   Batched:    mean loss + accuracy over a data loader, the
//               same routine the trainer uses for validation.
//               The test pass runs max(1, ⌊N / batch⌋) steps,
//               so with N not a multiple of the batch size the
//               trailing partial batch is not scored.
//               burn's loader ends a pass at the first image
//               that fails to decode; ensure_complete turns the
//               resulting shortfall into an error.
//
//   Per-sample: PredictionStream runs the model on one image
//               at a time, yielding a PredictionRecord per
//               image. Records are folded into a confusion
//               matrix (and optionally a CSV) as they arrive.

use anyhow::{anyhow, bail, Result};
use burn::{data::dataloader::DataLoader, nn::loss::CrossEntropyLossConfig, prelude::*};

use crate::data::batcher::RetinaBatch;
use crate::domain::{
    evaluation::{BatchTally, ConfusionMatrix, EvalSummary, PredictionRecord},
    sample::{ClassMap, Sample},
};
use crate::ml::{inferencer::Inferencer, model::RetinaNet};

/// Number of correct argmax predictions in a batch.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1]; flatten to [batch] before comparing
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    correct.max(0) as usize
}

/// Mean cross-entropy and accuracy over every batch the iterator yields.
pub fn evaluate_batches<B: Backend>(
    model: &RetinaNet<B>,
    batches: impl Iterator<Item = RetinaBatch<B>>,
) -> EvalSummary {
    let mut tally = BatchTally::new();

    for batch in batches {
        let batch_size = batch.targets.dims()[0];
        let logits     = model.forward_logits(batch.images);

        let ce   = CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), batch.targets.clone());

        let batch_loss: f64 = loss.into_scalar().elem::<f64>();
        tally.push(batch_loss, count_correct(logits, batch.targets), batch_size);
    }

    tally.finish()
}

/// Fail when a pass scored fewer images than it was handed. The data
/// loader stops at the first item `RetinaDataset` could not decode, so
/// a short pass would otherwise report figures for a prefix of the data.
pub fn ensure_complete(pass: &str, summary: &EvalSummary, expected: usize) -> Result<()> {
    if summary.samples < expected {
        bail!(
            "{pass} pass scored only {} of {expected} images; an image failed to decode (see the error above)",
            summary.samples
        );
    }
    Ok(())
}

/// Steps of the batched test pass: ⌊len / batch_size⌋, at least one.
pub fn batched_steps(len: usize, batch_size: usize) -> usize {
    if len == 0 || batch_size == 0 {
        return 0;
    }
    (len / batch_size).max(1)
}

/// Batched test evaluation over the first `batched_steps` batches.
/// `loader` must yield batches in order, without worker threads.
pub fn evaluate_batched<B: Backend>(
    model: &RetinaNet<B>,
    loader: &dyn DataLoader<RetinaBatch<B>>,
    len: usize,
    batch_size: usize,
) -> Result<EvalSummary> {
    let steps = batched_steps(len, batch_size);
    tracing::debug!("Batched evaluation: {steps} step(s) of {batch_size} over {len} images");
    let summary = evaluate_batches(model, loader.iter().take(steps));
    ensure_complete("Batched test", &summary, (steps * batch_size).min(len))?;
    Ok(summary)
}

// ─── Per-sample evaluation ────────────────────────────────────────────────────
/// Lazily predicts each sample in turn.
///
/// A sample whose label is not in the class map, or whose image
/// cannot be decoded, yields an error; the caller decides whether
/// that ends the pass.
pub struct PredictionStream<'a, B: Backend> {
    inferencer: &'a Inferencer<B>,
    classes:    &'a ClassMap,
    samples:    std::slice::Iter<'a, Sample>,
}

impl<'a, B: Backend> PredictionStream<'a, B> {
    pub fn new(inferencer: &'a Inferencer<B>, classes: &'a ClassMap, samples: &'a [Sample]) -> Self {
        Self {
            inferencer,
            classes,
            samples: samples.iter(),
        }
    }
}

impl<B: Backend> Iterator for PredictionStream<'_, B> {
    type Item = Result<PredictionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.samples.next()?;
        Some(predict_sample(self.inferencer, self.classes, sample))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

fn predict_sample<B: Backend>(
    inferencer: &Inferencer<B>,
    classes: &ClassMap,
    sample: &Sample,
) -> Result<PredictionRecord> {
    let actual = classes
        .index_of(&sample.label)
        .ok_or_else(|| anyhow!("Label '{}' of '{}' is not a known class", sample.label, sample.path.display()))?;

    let (predicted, confidence) = inferencer.predict(&sample.path)?;

    Ok(PredictionRecord {
        path: sample.path.clone(),
        actual,
        predicted,
        confidence,
    })
}

/// Fold a prediction stream into a confusion matrix, handing each
/// record to `on_record` before it is dropped.
pub fn collect_confusion<I>(
    records: I,
    num_classes: usize,
    mut on_record: impl FnMut(&PredictionRecord) -> Result<()>,
) -> Result<ConfusionMatrix>
where
    I: Iterator<Item = Result<PredictionRecord>>,
{
    let mut matrix = ConfusionMatrix::new(num_classes);
    for record in records {
        let record = record?;
        on_record(&record)?;
        matrix.record(record.actual, record.predicted);
    }
    Ok(matrix)
}
