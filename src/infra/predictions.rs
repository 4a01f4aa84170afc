use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use crate::domain::{evaluation::PredictionRecord, sample::ClassMap};

/// Streams prediction records to CSV, one row per test image.
pub struct PredictionWriter {
    out: BufWriter<File>,
}

impl PredictionWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path).with_context(|| format!("Cannot create '{}'", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "path,actual,predicted,confidence,correct")?;
        Ok(Self { out })
    }

    pub fn write(&mut self, record: &PredictionRecord, classes: &ClassMap) -> Result<()> {
        writeln!(
            self.out,
            "{},{},{},{:.6},{}",
            csv_field(&record.path.display().to_string()),
            classes.name(record.actual).unwrap_or("?"),
            classes.name(record.predicted).unwrap_or("?"),
            record.confidence,
            u8::from(record.is_correct()),
        )?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Quote a field that contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_rows_use_class_names() {
        let tmp     = tempfile::tempdir().unwrap();
        let path    = tmp.path().join("out").join("predictions.csv");
        let classes = ClassMap::from_names(vec!["Mild".to_string(), "No_DR".to_string()]);

        let mut w = PredictionWriter::create(&path).unwrap();
        w.write(
            &PredictionRecord { path: PathBuf::from("a.png"), actual: 1, predicted: 0, confidence: 0.5 },
            &classes,
        )
        .unwrap();
        w.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("a.png,No_DR,Mild,0.500000,0"));
    }

    #[test]
    fn test_paths_with_commas_and_quotes_are_quoted() {
        let tmp     = tempfile::tempdir().unwrap();
        let path    = tmp.path().join("predictions.csv");
        let classes = ClassMap::from_names(vec!["Mild".to_string(), "No_DR".to_string()]);

        let mut w = PredictionWriter::create(&path).unwrap();
        w.write(
            &PredictionRecord {
                path:       PathBuf::from("eyes, left/\"odd\".png"),
                actual:     0,
                predicted:  0,
                confidence: 0.25,
            },
            &classes,
        )
        .unwrap();
        w.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some("\"eyes, left/\"\"odd\"\".png\",Mild,Mild,0.250000,1")
        );
    }

    #[test]
    fn test_plain_fields_stay_unquoted() {
        assert_eq!(csv_field("train/Mild/a.png"), "train/Mild/a.png");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
    }
}
