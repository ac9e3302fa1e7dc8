use crate::config::LabelsConfig;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

pub const NO_SOLUTION: &str = "No solution available.";

const DEFAULT_CLASSES: [(&str, Option<&str>); 7] = [
    (
        "Aeromoniasis (Bacterial disease)",
        Some("Use antibiotics like Oxytetracycline in water."),
    ),
    (
        "Bacterial Red disease",
        Some("Treat water with potassium permanganate."),
    ),
    (
        "Bacterial gill disease",
        Some("Improve water quality and add formalin to water."),
    ),
    (
        "Fin and Tail Rot disease(Viral)",
        Some("Isolate fish and improve water sanitation."),
    ),
    ("Healthy Fish", Some("No action needed. Fish is healthy.")),
    (
        "Parasitic diseases",
        Some("Use anti-parasitic treatment like Praziquantel."),
    ),
    (
        "Saprolegniasis (Fungal disease)",
        Some("Apply malachite green or salt treatment."),
    ),
];

/// Ordered class names plus the remedy attached to each of them.
///
/// Position `i` names the class scored at index `i` of the model output, so
/// the order must match the one the model was trained with. Built once at
/// startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct LabelCatalog {
    class_labels: Vec<String>,
    solutions: HashMap<String, String>,
}

impl LabelCatalog {
    pub fn new(class_labels: Vec<String>, solutions: HashMap<String, String>) -> Self {
        Self {
            class_labels,
            solutions,
        }
    }

    pub fn from_config(labels_cfg: &LabelsConfig) -> Result<Self, String> {
        match &labels_cfg.labels_file {
            Some(path) => {
                load_labels(path).map_err(|e| format!("Failed to load labels: {}", e))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.class_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_labels.is_empty()
    }

    pub fn get_label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index).map(String::as_str)
    }

    pub fn get_labels(&self) -> &[String] {
        &self.class_labels
    }

    /// Remedy for `label`, or [`NO_SOLUTION`] when the table has no entry.
    pub fn solution_for(&self, label: &str) -> &str {
        self.solutions
            .get(label)
            .map(String::as_str)
            .unwrap_or(NO_SOLUTION)
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        let class_labels = DEFAULT_CLASSES
            .iter()
            .map(|(label, _)| label.to_string())
            .collect();
        let solutions = DEFAULT_CLASSES
            .iter()
            .filter_map(|(label, solution)| solution.map(|s| (label.to_string(), s.to_string())))
            .collect();

        Self::new(class_labels, solutions)
    }
}

/// Reads one class per line as `label[,remedy]`. Blank lines are skipped and
/// the remedy may itself contain commas.
pub fn load_labels(filepath: &Path) -> io::Result<LabelCatalog> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut class_labels = Vec::new();
    let mut solutions = HashMap::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let (label, solution) = match line.split_once(',') {
            Some((label, solution)) => (label.trim(), Some(solution.trim())),
            None => (line.trim(), None),
        };

        if label.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }
        if class_labels.iter().any(|existing| existing == label) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Duplicate class label: {}", label),
            ));
        }

        if let Some(solution) = solution.filter(|s| !s.is_empty()) {
            solutions.insert(label.to_string(), solution.to_string());
        }
        class_labels.push(label.to_string());
    }

    if class_labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Labels file contains no classes",
        ));
    }

    Ok(LabelCatalog::new(class_labels, solutions))
}
