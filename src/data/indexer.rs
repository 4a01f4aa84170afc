// ============================================================
// Layer 4 — Dataset Indexer
// ============================================================
// Walks a root directory laid out as
//
//   <root>/<ClassName>/<image files>
//
// and produces one Sample per file. Only one level of nesting
// is read: nested directories inside a class folder are
// skipped, as are hidden entries (".DS_Store" and friends).
//
// Classes and files are sorted by name so that the same
// directory always produces the same sample order; together
// with a fixed split seed this makes the test set reproducible
// between `train` and `evaluate`.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::domain::sample::{Sample, Severity};
use crate::domain::traits::SampleSource;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory '{0}' does not exist or is not a directory")]
    MissingRoot(PathBuf),

    #[error("dataset directory '{0}' contains no class sub-directories")]
    NoClasses(PathBuf),

    #[error("class folder '{0}' contains no image files")]
    EmptyClass(PathBuf),

    #[error("cannot read image '{path}': {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("the {0} split is empty; add more images or change the split fractions")]
    EmptySplit(&'static str),

    #[error("invalid split fraction {0}; must lie strictly between 0 and 1")]
    InvalidFraction(f64),
}

/// Indexes a `<root>/<class>/<file>` tree.
pub struct DirectoryIndexer {
    root: PathBuf,
}

impl DirectoryIndexer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

}

impl SampleSource for DirectoryIndexer {
    fn load_samples(&self) -> Result<Vec<Sample>> {
        if !self.root.is_dir() {
            return Err(DatasetError::MissingRoot(self.root.clone()).into());
        }

        let class_dirs = sorted_entries(&self.root)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect::<Vec<_>>();

        if class_dirs.is_empty() {
            return Err(DatasetError::NoClasses(self.root.clone()).into());
        }

        let mut samples = Vec::new();
        for class_dir in class_dirs {
            let label = match class_dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    tracing::warn!("Skipping non UTF-8 class folder '{}'", class_dir.display());
                    continue;
                }
            };
            if Severity::from_label(&label).is_none() {
                tracing::warn!("Class folder '{}' is not a known retinopathy grade", label);
            }

            let files: Vec<PathBuf> = sorted_entries(&class_dir)?
                .into_iter()
                .filter(|p| p.is_file())
                .collect();

            if files.is_empty() {
                return Err(DatasetError::EmptyClass(class_dir).into());
            }

            tracing::debug!("Class '{}': {} files", label, files.len());
            samples.extend(files.into_iter().map(|path| Sample::new(path, label.clone())));
        }

        tracing::info!("Indexed {} images under '{}'", samples.len(), self.root.display());
        Ok(samples)
    }
}

/// Non-hidden entries of `dir`, sorted by file name.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot read directory '{}'", dir.display()))? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('.'));
        if !hidden {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Fully decode every sample's image. Fails on the first file that
/// cannot be opened, has an unknown format, or has corrupt pixel data.
pub fn verify_readable(samples: &[Sample]) -> Result<()> {
    for sample in samples {
        decode_fully(&sample.path).map_err(|reason| DatasetError::UnreadableImage {
            path: sample.path.clone(),
            reason,
        })?;
    }
    tracing::debug!("All {} images decode cleanly", samples.len());
    Ok(())
}

fn decode_fully(path: &Path) -> std::result::Result<(), String> {
    image::ImageReader::open(path)
        .map_err(|e| e.to_string())?
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .decode()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Per-class counts and the first `preview` files of each class.
pub fn class_overview(samples: &[Sample], preview: usize) -> Vec<(String, usize, Vec<PathBuf>)> {
    let mut out: Vec<(String, usize, Vec<PathBuf>)> = Vec::new();
    for sample in samples {
        let pos = match out.iter().position(|(label, _, _)| *label == sample.label) {
            Some(pos) => pos,
            None => {
                out.push((sample.label.clone(), 0, Vec::new()));
                out.len() - 1
            }
        };
        let (_, count, files) = &mut out[pos];
        *count += 1;
        if files.len() < preview {
            files.push(sample.path.clone());
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}
