//! Labeled 28×28 grayscale image batches and the sources that produce them.
//!
//! Providers hand out host-side [`ImageBatch`] values: pixels normalized to
//! `[0, 1]` laid out as `[N, 28, 28, 1]`, and one-hot labels laid out as
//! `[N, 10]`. The trainer converts them into device tensors.

use std::path::{Path, PathBuf};

use burn::tensor::{Tensor, TensorData, backend::Backend};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;

use crate::config::{DatasetSettings, DatasetSourceKind};

pub mod idx;
pub mod sprite;
pub mod synthetic;

pub use idx::IdxProvider;
pub use sprite::SpriteProvider;
pub use synthetic::SyntheticProvider;

/// Side length of a dataset image.
pub const IMAGE_SIDE: usize = 28;
/// Pixels per dataset image.
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
/// Number of label classes.
pub const NUM_CLASSES: usize = 10;

/// A batch whose buffers do not match the expected layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataShapeError {
    #[error("pixel buffer holds {actual} values, expected {expected} for {rows} images")]
    Pixels {
        rows: usize,
        expected: usize,
        actual: usize,
    },
    #[error("label buffer holds {actual} values, expected {expected} for {rows} images")]
    Labels {
        rows: usize,
        expected: usize,
        actual: usize,
    },
    #[error("requested {requested} images but the provider returned {actual}")]
    RowCount { requested: usize, actual: usize },
    #[error("label {label} is out of range for {NUM_CLASSES} classes")]
    LabelOutOfRange { label: usize },
    #[error("batch is empty")]
    Empty,
}

/// Failures while opening or reading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode sprite sheet {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Malformed dataset file {path}: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("Dataset source {0:?} needs a directory; set dataset.path in the settings")]
    MissingPath(DatasetSourceKind),
    #[error("Dataset has no {0} images")]
    EmptyPool(&'static str),
    #[error(transparent)]
    Shape(#[from] DataShapeError),
}

/// Source of labeled training and evaluation images.
pub trait DatasetProvider {
    /// Next `n` training images, sampled from the training pool.
    fn next_train_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError>;
    /// Next `n` evaluation images, sampled from the held-out pool.
    fn next_test_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError>;
}

impl<P: DatasetProvider + ?Sized> DatasetProvider for Box<P> {
    fn next_train_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        (**self).next_train_batch(n)
    }

    fn next_test_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        (**self).next_test_batch(n)
    }
}

/// Host-side batch of images and one-hot labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pixels: Vec<f32>,
    labels: Vec<f32>,
    len: usize,
}

impl ImageBatch {
    /// Wrap flat buffers, checking that they describe the same number of images.
    pub fn new(pixels: Vec<f32>, labels: Vec<f32>) -> Result<Self, DataShapeError> {
        if labels.len() % NUM_CLASSES != 0 {
            return Err(DataShapeError::Labels {
                rows: labels.len() / NUM_CLASSES,
                expected: (labels.len() / NUM_CLASSES) * NUM_CLASSES,
                actual: labels.len(),
            });
        }
        let len = labels.len() / NUM_CLASSES;
        if len == 0 {
            return Err(DataShapeError::Empty);
        }
        if pixels.len() != len * IMAGE_PIXELS {
            return Err(DataShapeError::Pixels {
                rows: len,
                expected: len * IMAGE_PIXELS,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            labels,
            len,
        })
    }

    /// Build a batch from flat images and integer class ids.
    pub fn from_class_ids(pixels: Vec<f32>, classes: &[usize]) -> Result<Self, DataShapeError> {
        let mut labels = vec![0.0f32; classes.len() * NUM_CLASSES];
        for (row, &class) in classes.iter().enumerate() {
            if class >= NUM_CLASSES {
                return Err(DataShapeError::LabelOutOfRange { label: class });
            }
            labels[row * NUM_CLASSES + class] = 1.0;
        }
        Self::new(pixels, labels)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Pixels of a single image, row-major.
    pub fn image(&self, row: usize) -> &[f32] {
        &self.pixels[row * IMAGE_PIXELS..(row + 1) * IMAGE_PIXELS]
    }

    /// Class id of a row, i.e. the arg-max of its one-hot label.
    pub fn class_of(&self, row: usize) -> usize {
        argmax(&self.labels[row * NUM_CLASSES..(row + 1) * NUM_CLASSES])
    }

    /// Fail unless the batch holds exactly `requested` images.
    pub fn expect_rows(&self, requested: usize) -> Result<(), DataShapeError> {
        if self.len != requested {
            return Err(DataShapeError::RowCount {
                requested,
                actual: self.len,
            });
        }
        Ok(())
    }

    /// Move the buffers into device tensors shaped `[N, 28, 28, 1]` and `[N, 10]`.
    pub fn into_tensors<B: Backend>(self, device: &B::Device) -> TensorBatch<B> {
        let Self {
            pixels,
            labels,
            len,
        } = self;
        TensorBatch {
            images: Tensor::from_data(
                TensorData::new(pixels, [len, IMAGE_SIDE, IMAGE_SIDE, 1]),
                device,
            ),
            targets: Tensor::from_data(TensorData::new(labels, [len, NUM_CLASSES]), device),
        }
    }
}

/// Device-resident batch.
#[derive(Debug, Clone)]
pub struct TensorBatch<B: Backend> {
    /// `[N, 28, 28, 1]` pixels.
    pub images: Tensor<B, 4>,
    /// `[N, 10]` one-hot targets.
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> TensorBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (idx, &value)| {
            if value > best.1 { (idx, value) } else { best }
        })
        .0
}

/// Seeded shuffled walk over a pool of example indices that wraps around.
#[derive(Debug, Clone)]
pub(crate) struct ShuffledCursor {
    order: Vec<usize>,
    next: usize,
}

impl ShuffledCursor {
    pub(crate) fn new(pool: std::ops::Range<usize>, seed: u64) -> Self {
        let mut order: Vec<usize> = pool.collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        Self { order, next: 0 }
    }

    pub(crate) fn take(&mut self, n: usize) -> Vec<usize> {
        if self.order.is_empty() {
            return Vec::new();
        }
        (0..n)
            .map(|_| {
                let idx = self.order[self.next];
                self.next = (self.next + 1) % self.order.len();
                idx
            })
            .collect()
    }

    pub(crate) fn pool_len(&self) -> usize {
        self.order.len()
    }
}

/// Open the provider described by the dataset settings.
pub fn open_provider(
    settings: &DatasetSettings,
    seed: u64,
) -> Result<Box<dyn DatasetProvider + Send>, DatasetError> {
    let dir = |kind| settings.path.as_deref().ok_or(DatasetError::MissingPath(kind));
    Ok(match settings.source {
        DatasetSourceKind::Synthetic => Box::new(SyntheticProvider::new(seed)),
        DatasetSourceKind::Sprite => Box::new(SpriteProvider::open(
            dir(DatasetSourceKind::Sprite)?,
            settings.sprite_test_elements,
            seed,
        )?),
        DatasetSourceKind::Idx => Box::new(IdxProvider::open(dir(DatasetSourceKind::Idx)?, seed)?),
    })
}

/// Guess the file-backed format stored in `dir` from the files it contains.
pub fn detect_source(dir: &Path) -> Option<DatasetSourceKind> {
    if dir.join(sprite::IMAGES_FILE).is_file() && dir.join(sprite::LABELS_FILE).is_file() {
        return Some(DatasetSourceKind::Sprite);
    }
    if dir.join(idx::TRAIN_IMAGES_FILE).is_file() && dir.join(idx::TEST_IMAGES_FILE).is_file() {
        return Some(DatasetSourceKind::Idx);
    }
    None
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, DatasetError> {
    std::fs::read(path).map_err(|source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn rejects_pixel_label_mismatch() {
        let err = ImageBatch::new(vec![0.0; IMAGE_PIXELS], vec![0.0; 2 * NUM_CLASSES]).unwrap_err();
        assert_eq!(
            err,
            DataShapeError::Pixels {
                rows: 2,
                expected: 2 * IMAGE_PIXELS,
                actual: IMAGE_PIXELS,
            }
        );
    }

    #[test]
    fn rejects_ragged_labels_and_empty_batches() {
        assert!(matches!(
            ImageBatch::new(vec![0.0; IMAGE_PIXELS], vec![0.0; 7]),
            Err(DataShapeError::Labels { .. })
        ));
        assert_eq!(
            ImageBatch::new(Vec::new(), Vec::new()).unwrap_err(),
            DataShapeError::Empty
        );
        assert_eq!(
            ImageBatch::from_class_ids(vec![0.0; IMAGE_PIXELS], &[10]).unwrap_err(),
            DataShapeError::LabelOutOfRange { label: 10 }
        );
    }

    #[test]
    fn class_ids_become_one_hot_rows() {
        let batch = ImageBatch::from_class_ids(vec![0.5; 3 * IMAGE_PIXELS], &[0, 9, 4]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.class_of(1), 9);
        assert_eq!(batch.class_of(2), 4);
        for row in batch.labels().chunks(NUM_CLASSES) {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
        }
        assert!(batch.expect_rows(3).is_ok());
        assert_eq!(
            batch.expect_rows(4),
            Err(DataShapeError::RowCount {
                requested: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn tensors_have_channels_last_layout() {
        let batch = ImageBatch::from_class_ids(vec![0.25; 2 * IMAGE_PIXELS], &[1, 2]).unwrap();
        let tensors = batch.into_tensors::<NdArray>(&Default::default());
        assert_eq!(tensors.images.dims(), [2, IMAGE_SIDE, IMAGE_SIDE, 1]);
        assert_eq!(tensors.targets.dims(), [2, NUM_CLASSES]);
        assert_eq!(tensors.len(), 2);
    }

    #[test]
    fn cursor_wraps_and_visits_every_index_once_per_cycle() {
        let mut cursor = ShuffledCursor::new(10..15, 3);
        let mut first = cursor.take(5);
        let second = cursor.take(5);
        assert_eq!(first, second);
        first.sort_unstable();
        assert_eq!(first, vec![10, 11, 12, 13, 14]);
        assert_eq!(cursor.take(7).len(), 7);
        assert_eq!(cursor.pool_len(), 5);
    }

    #[test]
    fn detects_formats_from_file_names() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_source(dir.path()), None);
        std::fs::write(dir.path().join(idx::TRAIN_IMAGES_FILE), b"").unwrap();
        std::fs::write(dir.path().join(idx::TEST_IMAGES_FILE), b"").unwrap();
        assert_eq!(detect_source(dir.path()), Some(DatasetSourceKind::Idx));
        std::fs::write(dir.path().join(sprite::IMAGES_FILE), b"").unwrap();
        std::fs::write(dir.path().join(sprite::LABELS_FILE), b"").unwrap();
        assert_eq!(detect_source(dir.path()), Some(DatasetSourceKind::Sprite));
    }

    #[test]
    fn missing_directory_is_reported() {
        let settings = DatasetSettings {
            source: DatasetSourceKind::Idx,
            path: None,
            ..DatasetSettings::default()
        };
        assert!(matches!(
            open_provider(&settings, 1),
            Err(DatasetError::MissingPath(DatasetSourceKind::Idx))
        ));
    }
}
