// ============================================================
// Layer 2 — Console Reports
// ============================================================
// Every user-facing text block is built by one `render_*`
// function (testable) and printed by its `print_*` wrapper:
//
//   overview   — total images, per-class counts, first files
//   test       — batched loss/accuracy, per-sample accuracy,
//                confusion matrix, precision/recall/F1
//   prediction — class probabilities for one image

use std::fmt::Write;

use crate::application::{evaluate_use_case::TestReport, predict_use_case::Prediction};
use crate::data::indexer::class_overview;
use crate::domain::sample::{ClassMap, Sample};
use crate::ml::trainer::FitReport;

const PREVIEW_FILES: usize = 3;

pub fn render_overview(samples: &[Sample], classes: &ClassMap) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dataset: {} images in {} classes", samples.len(), classes.len());

    for (label, count, files) in class_overview(samples, PREVIEW_FILES) {
        let display = classes
            .index_of(&label)
            .map(|i| classes.display_name(i))
            .unwrap_or_else(|| label.clone());
        let _ = writeln!(out, "  {display:<28} {count:>6}");
        for file in files {
            let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let _ = writeln!(out, "      {name}");
        }
    }
    out
}

pub fn print_overview(samples: &[Sample], classes: &ClassMap) {
    println!("{}", render_overview(samples, classes));
}

pub fn render_fit(fit: &FitReport) -> String {
    let best = match (fit.best_epoch, fit.best_val_loss) {
        (Some(epoch), Some(loss)) => format!("best val_loss {loss:.4} at epoch {epoch}"),
        _ => "no improving epoch".to_string(),
    };
    let stop = if fit.stopped_early { " (early stop)" } else { "" };
    format!("Trained {} epoch(s){stop}; {best}", fit.epochs_run())
}

pub fn render_test_report(report: &TestReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Test loss (batched):      {:.4}", report.batched.loss);
    let _ = writeln!(out, "Test accuracy (batched):  {:.4}", report.batched.accuracy);
    let _ = writeln!(
        out,
        "Test accuracy (per image): {:.4} ({}/{})",
        report.per_sample_accuracy(),
        report.confusion.correct(),
        report.confusion.total()
    );
    let _ = writeln!(out, "\nConfusion matrix (rows = actual, columns = predicted):");
    out.push_str(&report.confusion.render(&report.classes));

    let _ = writeln!(out, "\n{:<28} {:>9} {:>9} {:>9} {:>8}", "class", "precision", "recall", "f1", "support");
    for s in report.confusion.class_scores() {
        let _ = writeln!(
            out,
            "{:<28} {:>9.4} {:>9.4} {:>9.4} {:>8}",
            report.classes.display_name(s.class),
            s.precision,
            s.recall,
            s.f1,
            s.support
        );
    }
    out
}

pub fn print_test_report(report: &TestReport) {
    println!("{}", render_test_report(report));
}

pub fn render_prediction(p: &Prediction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", p.image.display());
    for (i, prob) in p.probabilities.iter().enumerate() {
        let marker = if i == p.predicted { "→" } else { " " };
        let _ = writeln!(out, " {marker} {:<28} {:>7.2}%", p.classes.display_name(i), prob * 100.0);
    }
    out
}

pub fn print_prediction(p: &Prediction) {
    println!("{}", render_prediction(p));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::{ConfusionMatrix, EvalSummary};
    use std::path::PathBuf;

    fn classes() -> ClassMap {
        ClassMap::from_names(vec!["Mild".to_string(), "No_DR".to_string()])
    }

    #[test]
    fn test_overview_counts_and_previews() {
        let samples: Vec<Sample> = (0..5)
            .map(|i| Sample::new(format!("train/Mild/m{i}.png"), "Mild"))
            .chain([Sample::new("train/No_DR/n0.png", "No_DR")])
            .collect();

        let text = render_overview(&samples, &classes());
        assert!(text.starts_with("Dataset: 6 images in 2 classes"));
        assert!(text.contains("Mild (grade 1)"));
        assert!(text.contains("m2.png"));
        assert!(!text.contains("m3.png"));
        assert!(text.contains("No_DR (grade 0)"));
    }

    #[test]
    fn test_report_lists_every_class() {
        let mut confusion = ConfusionMatrix::new(2);
        confusion.record(0, 0);
        confusion.record(1, 1);
        confusion.record(1, 1);
        confusion.record(1, 0);

        let report = TestReport {
            batched: EvalSummary { loss: 0.5, accuracy: 0.75, samples: 4 },
            confusion,
            classes: classes(),
        };
        let text = render_test_report(&report);
        assert!(text.contains("0.7500 (3/4)"));
        assert!(text.contains("Mild (grade 1)"));
        assert!(text.contains("No_DR (grade 0)"));
    }

    #[test]
    fn test_prediction_marks_the_winner() {
        let p = Prediction {
            image:         PathBuf::from("eye.png"),
            classes:       classes(),
            probabilities: vec![0.2, 0.8],
            predicted:     1,
        };
        let text = render_prediction(&p);
        let winner = text.lines().find(|l| l.contains("No_DR")).unwrap();
        assert!(winner.contains('→'));
        assert!(winner.contains("80.00%"));
    }
}
