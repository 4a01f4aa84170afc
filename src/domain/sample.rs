// ============================================================
// Layer 3 — Sample and Class Catalogue
// ============================================================
// A Sample is one fundus photograph on disk together with the
// name of the class folder it was found in. Samples are
// collected once by the indexer and never mutated.
//
// ClassMap turns label names into the integer indices the
// network is trained on. Indices follow the sorted order of
// the class names, so "Mild" is 0 and "Severe" is 4 for the
// standard five-grade dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One labelled image file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the image file
    pub path: PathBuf,

    /// Name of the class directory that contains the file
    pub label: String,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            path:  path.into(),
            label: label.into(),
        }
    }
}

// ─── Severity ─────────────────────────────────────────────────────────────────
/// The five diabetic retinopathy grades found in the fundus dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    NoDr,
    Mild,
    Moderate,
    Severe,
    ProliferateDr,
}

impl Severity {
    /// Map a class folder name to a grade.
    /// `Poliferate_DR` is the spelling used by the published folder layout.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "No_DR" => Some(Severity::NoDr),
            "Mild" => Some(Severity::Mild),
            "Moderate" => Some(Severity::Moderate),
            "Severe" => Some(Severity::Severe),
            "Proliferate_DR" | "Poliferate_DR" => Some(Severity::ProliferateDr),
            _ => None,
        }
    }

    /// Clinical grade, 0 (healthy) to 4 (proliferative).
    pub fn grade(self) -> u8 {
        match self {
            Severity::NoDr => 0,
            Severity::Mild => 1,
            Severity::Moderate => 2,
            Severity::Severe => 3,
            Severity::ProliferateDr => 4,
        }
    }
}

// ─── ClassMap ─────────────────────────────────────────────────────────────────
/// Sorted list of distinct labels; a label's index is its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMap {
    names: Vec<String>,
}

impl ClassMap {
    /// Build from the labels present in `samples`.
    pub fn from_samples(samples: &[Sample]) -> Self {
        Self::from_names(samples.iter().map(|s| s.label.clone()))
    }

    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.names.binary_search_by(|n| n.as_str().cmp(label)).ok()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Human readable name, with the clinical grade when the label is known.
    pub fn display_name(&self, index: usize) -> String {
        match self.name(index) {
            Some(name) => match Severity::from_label(name) {
                Some(sev) => format!("{name} (grade {})", sev.grade()),
                None => name.to_string(),
            },
            None => format!("class {index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_indices_are_alphabetical() {
        let map = ClassMap::from_names(
            ["Severe", "No_DR", "Mild", "Proliferate_DR", "Moderate", "Mild"]
                .iter()
                .map(|s| s.to_string()),
        );
        assert_eq!(map.len(), 5);
        assert_eq!(map.index_of("Mild"), Some(0));
        assert_eq!(map.index_of("Moderate"), Some(1));
        assert_eq!(map.index_of("No_DR"), Some(2));
        assert_eq!(map.index_of("Proliferate_DR"), Some(3));
        assert_eq!(map.index_of("Severe"), Some(4));
        assert_eq!(map.index_of("Unknown"), None);
    }

    #[test]
    fn test_severity_alias() {
        assert_eq!(Severity::from_label("Poliferate_DR"), Some(Severity::ProliferateDr));
        assert_eq!(Severity::from_label("Proliferate_DR"), Some(Severity::ProliferateDr));
        assert_eq!(Severity::from_label("cats"), None);
        let grades: Vec<u8> = ["No_DR", "Mild", "Moderate", "Severe", "Proliferate_DR"]
            .iter()
            .filter_map(|l| Severity::from_label(l))
            .map(Severity::grade)
            .collect();
        assert_eq!(grades, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_display_name() {
        let map = ClassMap::from_names(vec!["No_DR".to_string(), "other".to_string()]);
        assert_eq!(map.display_name(0), "No_DR (grade 0)");
        assert_eq!(map.display_name(1), "other");
        assert_eq!(map.display_name(7), "class 7");
    }
}
