use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("failed to read label file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse label file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("label file must hold a JSON object keyed by disease name")]
    NotAnObject,
    #[error("label file holds no labels")]
    Empty,
}

/// The fixed, ordered list of disease names the classifier can output.
///
/// Labels are read from the keys of the advice/prescription table, in file
/// order: index `i` of a probability vector belongs to the `i`-th key. The
/// values are kept as a reference table, looked up by label.
#[derive(Debug, Clone, Default)]
pub struct LabelSet {
    names: Vec<String>,
    reference: Map<String, Value>,
}

impl LabelSet {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            reference: Map::new(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, LabelError> {
        let Value::Object(reference) = serde_json::from_str::<Value>(raw)? else {
            return Err(LabelError::NotAnObject);
        };

        if reference.is_empty() {
            return Err(LabelError::Empty);
        }

        Ok(Self {
            names: reference.keys().cloned().collect(),
            reference,
        })
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn reference(&self, label: &str) -> Option<&Value> {
        self.reference.get(label)
    }
}
