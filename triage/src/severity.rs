//! Aggregation of per-image probability vectors into one assessment.
//!
//! Everything here is pure: the request handler feeds in the vectors it
//! managed to compute and gets back the severity score and the predicted
//! disease list.

use crate::labels::LabelSet;

/// Cutoff at or above which a label counts as predicted.
pub const DEFAULT_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assessment {
    /// Mean of the per-image maximum probability, `None` without images.
    pub severity: Option<f64>,
    /// Predicted labels, image by image then label by label. Not deduplicated.
    pub predicted: Vec<String>,
}

impl Assessment {
    pub fn conclusion(&self) -> Option<&str> {
        self.predicted.first().map(String::as_str)
    }

    pub fn matched_disease(&self, symptoms: &str) -> Option<&str> {
        match_symptoms(&self.predicted, symptoms)
    }
}

/// The severity of a single image: its highest class probability.
pub fn vector_severity(vector: &[f32]) -> Option<f32> {
    vector.iter().copied().reduce(f32::max)
}

/// Labels of `vector` scoring at least `threshold`, in label order.
///
/// Entries past the end of the label set have no name and are ignored.
pub fn predicted_labels<'a>(
    vector: &'a [f32],
    labels: &'a LabelSet,
    threshold: f32,
) -> impl Iterator<Item = &'a str> + 'a {
    vector
        .iter()
        .zip(labels.iter())
        .filter(move |(probability, _)| **probability >= threshold)
        .map(|(_, label)| label)
}

pub fn aggregate(vectors: &[Vec<f32>], labels: &LabelSet, threshold: f32) -> Assessment {
    let maxima: Vec<f64> = vectors
        .iter()
        .filter_map(|vector| vector_severity(vector))
        .map(f64::from)
        .collect();

    let severity = match maxima.len() {
        0 => None,
        n => Some(maxima.iter().sum::<f64>() / n as f64),
    };

    let predicted = vectors
        .iter()
        .flat_map(|vector| predicted_labels(vector, labels, threshold))
        .map(str::to_owned)
        .collect();

    Assessment {
        severity,
        predicted,
    }
}

/// First predicted disease named in the symptom text, compared
/// case-insensitively. Falls back to the first predicted disease.
pub fn match_symptoms<'a>(predicted: &'a [String], symptoms: &str) -> Option<&'a str> {
    let symptoms = symptoms.to_lowercase();

    predicted
        .iter()
        .find(|disease| symptoms.contains(&disease.to_lowercase()))
        .or_else(|| predicted.first())
        .map(String::as_str)
}
