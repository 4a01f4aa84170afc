// ============================================================
// Layer 5 — Validation Loss Monitor
// ============================================================
// Tracks the best validation loss of a run and drives the two
// end-of-epoch policies:
//
//   - best checkpoint: save when the loss is strictly lower
//     than every loss seen before in this run
//   - early stopping:  stop once `patience` consecutive epochs
//     have gone by without such an improvement
//
// A NaN loss never counts as an improvement.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The new loss is the best of the run; persist the weights
    pub improved: bool,
    /// Patience is exhausted; end training after this epoch
    pub stop:     bool,
}

#[derive(Debug, Clone)]
pub struct ValLossMonitor {
    patience:   usize,
    best:       Option<f64>,
    best_epoch: Option<usize>,
    stale:      usize,
}

impl ValLossMonitor {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: None,
            stale: 0,
        }
    }

    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> Verdict {
        let improved = !val_loss.is_nan() && self.best.map_or(true, |best| val_loss < best);

        if improved {
            self.best       = Some(val_loss);
            self.best_epoch = Some(epoch);
            self.stale      = 0;
        } else {
            self.stale += 1;
        }

        Verdict {
            improved,
            stop: self.stale >= self.patience && !improved,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Consecutive epochs since the last improvement.
    pub fn stale_epochs(&self) -> usize {
        self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(patience: usize, losses: &[f64]) -> Vec<Verdict> {
        let mut m = ValLossMonitor::new(patience);
        losses
            .iter()
            .enumerate()
            .map(|(i, l)| m.observe(i + 1, *l))
            .collect()
    }

    #[test]
    fn test_first_epoch_always_improves() {
        let v = run(3, &[5.0]);
        assert!(v[0].improved);
        assert!(!v[0].stop);
    }

    #[test]
    fn test_save_only_on_strict_improvement() {
        let v = run(10, &[2.0, 2.0, 1.5, 1.7, 1.5, 1.4]);
        let saved: Vec<bool> = v.iter().map(|v| v.improved).collect();
        assert_eq!(saved, vec![true, false, true, false, false, true]);
    }

    #[test]
    fn test_stops_exactly_after_patience() {
        let v = run(2, &[1.0, 1.1, 1.2, 0.5]);
        assert!(!v[0].stop);
        assert!(!v[1].stop);
        assert!(v[2].stop);
    }

    #[test]
    fn test_improvement_resets_patience() {
        let v = run(2, &[1.0, 1.1, 0.9, 1.0, 1.0]);
        let stops: Vec<bool> = v.iter().map(|v| v.stop).collect();
        assert_eq!(stops, vec![false, false, false, false, true]);
    }

    #[test]
    fn test_nan_is_never_best() {
        let mut m = ValLossMonitor::new(5);
        assert!(!m.observe(1, f64::NAN).improved);
        assert!(m.observe(2, 3.0).improved);
        assert!(!m.observe(3, f64::NAN).improved);
        assert_eq!(m.best(), Some(3.0));
        assert_eq!(m.best_epoch(), Some(2));
        assert_eq!(m.stale_epochs(), 1);
    }

    #[test]
    fn test_zero_patience_stops_on_first_plateau() {
        let v = run(0, &[1.0, 1.0]);
        assert!(!v[0].stop);
        assert!(v[1].stop);
    }
}
