// ============================================================
// Layer 3 — Evaluation Results
// ============================================================
// Plain containers for what evaluation produces:
//
//   PredictionRecord — one (true label, predicted label) pair
//   ConfusionMatrix  — running counts, built one record at a
//                      time so the per-sample stream never has
//                      to keep the records around
//   EvalSummary      — average loss + accuracy of a pass over
//                      a data loader
//   BatchTally       — accumulates per-batch results into an
//                      EvalSummary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::sample::ClassMap;

/// Outcome of one forward pass over a single test image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub path:       PathBuf,
    pub actual:     usize,
    pub predicted:  usize,
    /// Probability assigned to the predicted class
    pub confidence: f32,
}

impl PredictionRecord {
    pub fn is_correct(&self) -> bool {
        self.actual == self.predicted
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

// ─── ConfusionMatrix ──────────────────────────────────────────────────────────
/// `counts[actual][predicted]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

/// Per-class precision / recall / F1 line of a classification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub class:     usize,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   usize,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; num_classes]; num_classes],
        }
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    /// Count one prediction. Indices outside the matrix are ignored.
    pub fn record(&mut self, actual: usize, predicted: usize) {
        if let Some(cell) = self.counts.get_mut(actual).and_then(|row| row.get_mut(predicted)) {
            *cell += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.num_classes()).map(|i| self.counts[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f64 / total as f64
        }
    }

    pub fn class_scores(&self) -> Vec<ClassScores> {
        let n = self.num_classes();
        (0..n)
            .map(|c| {
                let tp        = self.counts[c][c];
                let support   = self.counts[c].iter().sum::<usize>();
                let predicted = (0..n).map(|r| self.counts[r][c]).sum::<usize>();
                let precision = ratio(tp, predicted);
                let recall    = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassScores { class: c, precision, recall, f1, support }
            })
            .collect()
    }

    /// Text table with row = actual class, column = predicted class.
    pub fn render(&self, classes: &ClassMap) -> String {
        let n     = self.num_classes();
        let label = |i: usize| classes.name(i).unwrap_or("?").to_string();
        let width = (0..n).map(|i| label(i).len()).max().unwrap_or(1).max(6);

        let mut out = format!("{:>width$} |", "actual");
        for c in 0..n {
            out.push_str(&format!(" {:>width$}", label(c)));
        }
        out.push('\n');
        out.push_str(&"-".repeat((width + 1) * (n + 1) + 1));
        out.push('\n');
        for r in 0..n {
            out.push_str(&format!("{:>width$} |", label(r)));
            for c in 0..n {
                out.push_str(&format!(" {:>width$}", self.counts[r][c]));
            }
            out.push('\n');
        }
        out
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

// ─── EvalSummary / BatchTally ─────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    /// Mean cross-entropy per sample; NaN when no batch was seen
    pub loss:     f64,
    pub accuracy: f64,
    pub samples:  usize,
}

#[derive(Debug, Default, Clone)]
pub struct BatchTally {
    loss_sum: f64,
    correct:  usize,
    samples:  usize,
}

impl BatchTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// `batch_loss` is the mean loss of a batch of `batch_size` samples.
    pub fn push(&mut self, batch_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += batch_loss * batch_size as f64;
        self.correct  += correct;
        self.samples  += batch_size;
    }

    pub fn finish(&self) -> EvalSummary {
        if self.samples == 0 {
            return EvalSummary { loss: f64::NAN, accuracy: 0.0, samples: 0 };
        }
        EvalSummary {
            loss:     self.loss_sum / self.samples as f64,
            accuracy: self.correct as f64 / self.samples as f64,
            samples:  self.samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(actual: usize, predicted: usize) -> PredictionRecord {
        PredictionRecord {
            path: PathBuf::from(format!("img_{actual}_{predicted}.png")),
            actual,
            predicted,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_three_of_four_correct() {
        let records = vec![rec(0, 0), rec(1, 1), rec(2, 0), rec(3, 3)];
        assert_eq!(records.iter().filter(|r| r.is_correct()).count(), 3);

        let mut cm = ConfusionMatrix::new(5);
        for r in &records {
            cm.record(r.actual, r.predicted);
        }
        assert_eq!(cm.accuracy(), 0.75);
        assert_eq!(cm.get(2, 0), 1);
    }

    #[test]
    fn test_empty_accuracy_is_zero() {
        assert_eq!(ConfusionMatrix::new(3).accuracy(), 0.0);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_class_scores() {
        let mut cm = ConfusionMatrix::new(2);
        // class 0: 2 right, 1 predicted as 1; class 1: 1 right
        cm.record(0, 0);
        cm.record(0, 0);
        cm.record(0, 1);
        cm.record(1, 1);
        let scores = cm.class_scores();
        assert_eq!(scores[0].support, 3);
        assert_eq!(scores[0].precision, 1.0);
        assert!((scores[0].recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(scores[1].precision, 0.5);
        assert_eq!(scores[1].recall, 1.0);
    }

    #[test]
    fn test_out_of_range_record_ignored() {
        let mut cm = ConfusionMatrix::new(2);
        cm.record(5, 0);
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn test_tally_weights_by_batch_size() {
        let mut t = BatchTally::new();
        t.push(1.0, 2, 2);
        t.push(4.0, 0, 1);
        let s = t.finish();
        assert_eq!(s.samples, 3);
        assert!((s.loss - 2.0).abs() < 1e-12);
        assert!((s.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert!(BatchTally::new().finish().loss.is_nan());
    }
}
