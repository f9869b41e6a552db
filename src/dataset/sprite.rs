//! Sprite-sheet dataset used by browser demos.
//!
//! The sheet is a PNG whose every row holds one flattened 28×28 image (so it is
//! 784 pixels wide). Labels are a raw byte file with ten bytes per image, one
//! of which is `1`. The trailing `test_elements` images form the held-out pool.

use std::path::Path;

use super::{
    DatasetError, DatasetProvider, IMAGE_PIXELS, ImageBatch, NUM_CLASSES, ShuffledCursor,
    read_file,
};

/// Sprite sheet file name inside the dataset directory.
pub const IMAGES_FILE: &str = "fashion_mnist_images.png";
/// One-hot label file name inside the dataset directory.
pub const LABELS_FILE: &str = "fashion_mnist_labels_uint8";
/// Held-out images at the end of the sheet unless configured otherwise.
pub const DEFAULT_TEST_ELEMENTS: usize = 10_000;

const TEST_CURSOR_SALT: u64 = 0x7e57;

pub struct SpriteProvider {
    pixels: Vec<u8>,
    labels: Vec<u8>,
    train: ShuffledCursor,
    test: ShuffledCursor,
}

impl SpriteProvider {
    /// Load the sprite sheet and labels from `dir`.
    pub fn open(dir: &Path, test_elements: usize, seed: u64) -> Result<Self, DatasetError> {
        let images_path = dir.join(IMAGES_FILE);
        let sheet = image::open(&images_path)
            .map_err(|source| DatasetError::Image {
                path: images_path.clone(),
                source,
            })?
            .to_luma8();
        if sheet.width() as usize != IMAGE_PIXELS {
            return Err(DatasetError::Format {
                path: images_path,
                reason: format!(
                    "sprite sheet is {} pixels wide, expected {IMAGE_PIXELS}",
                    sheet.width()
                ),
            });
        }
        let total = sheet.height() as usize;

        let labels_path = dir.join(LABELS_FILE);
        let labels = read_file(&labels_path)?;
        if labels.len() != total * NUM_CLASSES {
            return Err(DatasetError::Format {
                path: labels_path,
                reason: format!(
                    "{} label bytes for {total} images, expected {}",
                    labels.len(),
                    total * NUM_CLASSES
                ),
            });
        }
        if let Some(row) = labels
            .chunks(NUM_CLASSES)
            .position(|row| row.iter().map(|&b| b as usize).sum::<usize>() != 1)
        {
            return Err(DatasetError::Format {
                path: labels_path,
                reason: format!("label row {row} is not one-hot"),
            });
        }

        if test_elements == 0 {
            return Err(DatasetError::EmptyPool("test"));
        }
        if test_elements >= total {
            return Err(DatasetError::EmptyPool("training"));
        }
        let split = total - test_elements;
        tracing::info!(
            "Loaded sprite dataset from {}: {split} training, {test_elements} test images",
            dir.display()
        );
        Ok(Self {
            pixels: sheet.into_raw(),
            labels,
            train: ShuffledCursor::new(0..split, seed),
            test: ShuffledCursor::new(split..total, seed ^ TEST_CURSOR_SALT),
        })
    }

    pub fn train_len(&self) -> usize {
        self.train.pool_len()
    }

    pub fn test_len(&self) -> usize {
        self.test.pool_len()
    }

    fn gather(&self, indices: &[usize]) -> Result<ImageBatch, DatasetError> {
        let mut pixels = Vec::with_capacity(indices.len() * IMAGE_PIXELS);
        let mut labels = Vec::with_capacity(indices.len() * NUM_CLASSES);
        for &idx in indices {
            let image = &self.pixels[idx * IMAGE_PIXELS..(idx + 1) * IMAGE_PIXELS];
            pixels.extend(image.iter().map(|&p| p as f32 / 255.0));
            let label = &self.labels[idx * NUM_CLASSES..(idx + 1) * NUM_CLASSES];
            labels.extend(label.iter().map(|&b| b as f32));
        }
        Ok(ImageBatch::new(pixels, labels)?)
    }
}

impl DatasetProvider for SpriteProvider {
    fn next_train_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        let indices = self.train.take(n);
        self.gather(&indices)
    }

    fn next_test_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        let indices = self.test.take(n);
        self.gather(&indices)
    }
}
