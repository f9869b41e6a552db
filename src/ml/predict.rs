//! Single-image classification of canvas bitmaps.

use std::fmt;

use burn::tensor::{Tensor, TensorData, backend::Backend};
use image::{GrayImage, imageops, imageops::FilterType};
use thiserror::Error;

use super::model::FashionCnn;
use crate::dataset::{IMAGE_PIXELS, IMAGE_SIDE, NUM_CLASSES, argmax};

/// Display labels in class-index order.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FashionClass {
    TShirtTop,
    Trouser,
    Pullover,
    Dress,
    Coat,
    Sandal,
    Shirt,
    Sneaker,
    Bag,
    AnkleBoot,
}

impl FashionClass {
    pub const ALL: [FashionClass; NUM_CLASSES] = [
        FashionClass::TShirtTop,
        FashionClass::Trouser,
        FashionClass::Pullover,
        FashionClass::Dress,
        FashionClass::Coat,
        FashionClass::Sandal,
        FashionClass::Shirt,
        FashionClass::Sneaker,
        FashionClass::Bag,
        FashionClass::AnkleBoot,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        CLASS_NAMES[self.index()]
    }
}

impl fmt::Display for FashionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Cannot classify an empty image")]
    EmptyImage,
    #[error("Expected {IMAGE_PIXELS} pixels, got {0}")]
    PixelCount(usize),
    #[error("Model produced {0} class scores, expected {NUM_CLASSES}")]
    ClassCount(usize),
    #[error("Failed to read tensor data: {0}")]
    Tensor(String),
}

/// Outcome of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: FashionClass,
    /// Softmax output, indexed by class.
    pub probabilities: [f32; NUM_CLASSES],
}

impl Prediction {
    pub fn index(&self) -> usize {
        self.class.index()
    }

    pub fn label(&self) -> &'static str {
        self.class.label()
    }

    pub fn confidence(&self) -> f32 {
        self.probabilities[self.index()]
    }

    /// The `k` most probable classes, best first.
    pub fn top(&self, k: usize) -> Vec<(FashionClass, f32)> {
        let mut ranked: Vec<(FashionClass, f32)> = FashionClass::ALL
            .iter()
            .map(|&class| (class, self.probabilities[class.index()]))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);
        ranked
    }
}

/// Bilinear downsample of a bitmap to 28×28, normalized to `[0, 1]`.
///
/// The triangle filter averages over the whole source footprint of each
/// output pixel, so a 280 px canvas is area-averaged rather than sampled at
/// four neighbours per pixel. Thin strokes therefore come out as grey
/// coverage. Values are divided by 255 to match the range of the training
/// images.
pub fn downsample(bitmap: &GrayImage) -> Result<Vec<f32>, PredictError> {
    if bitmap.width() == 0 || bitmap.height() == 0 {
        return Err(PredictError::EmptyImage);
    }
    let small = imageops::resize(
        bitmap,
        IMAGE_SIDE as u32,
        IMAGE_SIDE as u32,
        FilterType::Triangle,
    );
    Ok(small.as_raw().iter().map(|&p| p as f32 / 255.0).collect())
}

/// Classify a grayscale bitmap of any size.
pub fn predict<B: Backend>(
    model: &FashionCnn<B>,
    bitmap: &GrayImage,
    device: &B::Device,
) -> Result<Prediction, PredictError> {
    let pixels = downsample(bitmap)?;
    predict_pixels(model, pixels, device)
}

/// Classify one normalized 28×28 image given as a flat row-major buffer.
pub fn predict_pixels<B: Backend>(
    model: &FashionCnn<B>,
    pixels: Vec<f32>,
    device: &B::Device,
) -> Result<Prediction, PredictError> {
    if pixels.len() != IMAGE_PIXELS {
        return Err(PredictError::PixelCount(pixels.len()));
    }
    let input = Tensor::<B, 4>::from_data(
        TensorData::new(pixels, [1, IMAGE_SIDE, IMAGE_SIDE, 1]),
        device,
    );
    let scores = model
        .forward(input)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| PredictError::Tensor(format!("{err:?}")))?;
    let probabilities: [f32; NUM_CLASSES] = scores
        .as_slice()
        .try_into()
        .map_err(|_| PredictError::ClassCount(scores.len()))?;
    let class = FashionClass::from_index(argmax(&probabilities))
        .ok_or(PredictError::ClassCount(scores.len()))?;
    tracing::debug!("Predicted {} ({:.3})", class, probabilities[class.index()]);
    Ok(Prediction {
        class,
        probabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::build_default_model;
    use burn::backend::NdArray;
    use image::Luma;

    type B = NdArray;

    #[test]
    fn label_table_follows_class_order() {
        assert_eq!(FashionClass::from_index(0).map(FashionClass::label), Some("T-shirt/top"));
        assert_eq!(FashionClass::from_index(9).map(FashionClass::label), Some("Ankle boot"));
        assert_eq!(FashionClass::from_index(10), None);
        for (idx, class) in FashionClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), idx);
            assert_eq!(class.to_string(), CLASS_NAMES[idx]);
        }
    }

    #[test]
    fn downsample_keeps_uniform_images_uniform() {
        let white = GrayImage::from_pixel(280, 280, Luma([255]));
        let pixels = downsample(&white).unwrap();
        assert_eq!(pixels.len(), IMAGE_PIXELS);
        assert!(pixels.iter().all(|&p| (p - 1.0).abs() < 0.01));
        assert!(matches!(
            downsample(&GrayImage::new(0, 0)),
            Err(PredictError::EmptyImage)
        ));
    }

    #[test]
    fn thin_strokes_are_area_averaged() {
        let mut bitmap = GrayImage::new(280, 280);
        for y in 0..280 {
            bitmap.put_pixel(145, y, Luma([255]));
        }
        let pixels = downsample(&bitmap).unwrap();
        let peak = pixels.iter().copied().fold(0.0f32, f32::max);
        assert!(peak > 0.0 && peak < 0.5, "peak {peak}");
        assert!(pixels[14 * 28 + 14] > 0.0);
        assert_eq!(pixels[14 * 28], 0.0);
    }

    #[test]
    fn blank_canvas_still_gets_a_label() {
        let device = Default::default();
        let model = build_default_model::<B>(&device).unwrap();
        let prediction = predict(&model, &GrayImage::new(280, 280), &device).unwrap();
        assert!(prediction.index() < NUM_CLASSES);
        assert!((prediction.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert_eq!(prediction.top(3).len(), 3);
        assert_eq!(prediction.top(1)[0].0, prediction.class);
    }

    #[test]
    fn prediction_is_deterministic_for_fixed_weights() {
        let device = Default::default();
        let model = build_default_model::<B>(&device).unwrap();
        let mut bitmap = GrayImage::new(280, 280);
        for y in 100..180 {
            for x in 40..240 {
                bitmap.put_pixel(x, y, Luma([255]));
            }
        }
        let first = predict(&model, &bitmap, &device).unwrap();
        let second = predict(&model, &bitmap, &device).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn wrong_pixel_count_is_rejected() {
        let device = Default::default();
        let model = build_default_model::<B>(&device).unwrap();
        assert!(matches!(
            predict_pixels(&model, vec![0.0; 10], &device),
            Err(PredictError::PixelCount(10))
        ));
    }
}
