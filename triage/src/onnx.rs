use std::path::Path;
use std::sync::Mutex;

use image::DynamicImage;
use ndarray::Axis;
use ort::session::Session;
use ort::value::Tensor;

use crate::classifier::{preprocess, Classifier, ClassifierError};

/// Runs an exported image classifier through ONNX Runtime.
///
/// The model takes a single `[1, size, size, 3]` float input and returns
/// a `[1, labels]` probability output.
pub struct OnnxClassifier {
    // Running a session needs exclusive access
    session: Mutex<Session>,
    input_size: u32,
}

impl OnnxClassifier {
    pub fn load(path: impl AsRef<Path>, input_size: u32) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let load_error = |e: &dyn std::fmt::Display| {
            ClassifierError::Load(format!("{}: {}", path.display(), e))
        };
        let session = Session::builder()
            .map_err(|e| load_error(&e))?
            .commit_from_file(path)
            .map_err(|e| load_error(&e))?;

        tracing::info!(
            model = %path.display(),
            input_size,
            "loaded image classifier"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Vec<f32>, ClassifierError> {
        let input = Tensor::from_array(preprocess(image, self.input_size))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let mut session = self.session.lock().map_err(|_| ClassifierError::Poisoned)?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or(ClassifierError::EmptyOutput)?;
        let probabilities = output
            .try_extract_array::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        // First (and only) row of the batch
        let row: Vec<f32> = if probabilities.ndim() > 1 {
            probabilities.index_axis(Axis(0), 0).iter().copied().collect()
        } else {
            probabilities.iter().copied().collect()
        };

        Ok(row)
    }
}
