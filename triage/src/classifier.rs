use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::Array4;
use thiserror::Error;

/// Side of the square input the model was trained on.
pub const DEFAULT_INPUT_SIZE: u32 = 150;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("model returned no output")]
    EmptyOutput,
    #[error("model returned {outputs} probabilities for {labels} labels")]
    LabelMismatch { outputs: usize, labels: usize },
    #[error("model session lock poisoned")]
    Poisoned,
}

/// Produces one probability per label for a decoded image.
///
/// Implementations are called from the blocking thread pool and may block.
pub trait Classifier {
    fn classify(&self, image: &DynamicImage) -> Result<Vec<f32>, ClassifierError>;
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ClassifierError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Resize to `size`x`size` and lay the pixels out as a `[1, size, size, 3]`
/// tensor with channels scaled to `[0, 1]`.
///
/// Nearest-neighbour sampling matches the loader the model was trained with.
pub fn preprocess(image: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let rgb = if rgb.dimensions() == (size, size) {
        rgb
    } else {
        imageops::resize(&rgb, size, size, FilterType::Nearest)
    };

    let side = size as usize;
    Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
        f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / 255.0
    })
}

/// Rejects vectors with more entries than there are labels to name them.
pub fn check_output_len(vector: &[f32], labels: usize) -> Result<(), ClassifierError> {
    if vector.len() > labels {
        return Err(ClassifierError::LabelMismatch {
            outputs: vector.len(),
            labels,
        });
    }
    Ok(())
}
