//! Canonical Fashion-MNIST IDX files.
//!
//! Image files start with the big-endian magic `2051`, then the image count,
//! row count and column count; label files start with `2049` and the label
//! count. Payloads are unsigned bytes.

use std::path::Path;

use super::{
    DatasetError, DatasetProvider, IMAGE_PIXELS, IMAGE_SIDE, ImageBatch, NUM_CLASSES,
    ShuffledCursor, read_file,
};

pub const TRAIN_IMAGES_FILE: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS_FILE: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES_FILE: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS_FILE: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;
const TEST_CURSOR_SALT: u64 = 0x1d8;

/// Images and labels of one IDX split.
#[derive(Debug, Clone)]
struct Split {
    pixels: Vec<u8>,
    labels: Vec<u8>,
    cursor: ShuffledCursor,
}

impl Split {
    fn load(images: &Path, labels: &Path, seed: u64) -> Result<Self, DatasetError> {
        let pixels = parse_images(images, &read_file(images)?)?;
        let labels_raw = parse_labels(labels, &read_file(labels)?)?;
        let count = pixels.len() / IMAGE_PIXELS;
        if labels_raw.len() != count {
            return Err(DatasetError::Format {
                path: labels.to_path_buf(),
                reason: format!("{} labels for {count} images", labels_raw.len()),
            });
        }
        if count == 0 {
            return Err(DatasetError::Format {
                path: images.to_path_buf(),
                reason: "no images".to_string(),
            });
        }
        Ok(Self {
            pixels,
            labels: labels_raw,
            cursor: ShuffledCursor::new(0..count, seed),
        })
    }

    fn next_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        let indices = self.cursor.take(n);
        let mut pixels = Vec::with_capacity(indices.len() * IMAGE_PIXELS);
        let mut classes = Vec::with_capacity(indices.len());
        for idx in indices {
            let image = &self.pixels[idx * IMAGE_PIXELS..(idx + 1) * IMAGE_PIXELS];
            pixels.extend(image.iter().map(|&p| p as f32 / 255.0));
            classes.push(self.labels[idx] as usize);
        }
        Ok(ImageBatch::from_class_ids(pixels, &classes)?)
    }
}

/// Provider over the four standard IDX files in a directory.
#[derive(Debug, Clone)]
pub struct IdxProvider {
    train: Split,
    test: Split,
}

impl IdxProvider {
    pub fn open(dir: &Path, seed: u64) -> Result<Self, DatasetError> {
        let train = Split::load(
            &dir.join(TRAIN_IMAGES_FILE),
            &dir.join(TRAIN_LABELS_FILE),
            seed,
        )?;
        let test = Split::load(
            &dir.join(TEST_IMAGES_FILE),
            &dir.join(TEST_LABELS_FILE),
            seed ^ TEST_CURSOR_SALT,
        )?;
        tracing::info!(
            "Loaded IDX dataset from {}: {} training, {} test images",
            dir.display(),
            train.cursor.pool_len(),
            test.cursor.pool_len()
        );
        Ok(Self { train, test })
    }
}

impl DatasetProvider for IdxProvider {
    fn next_train_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        self.train.next_batch(n)
    }

    fn next_test_batch(&mut self, n: usize) -> Result<ImageBatch, DatasetError> {
        self.test.next_batch(n)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let word = bytes.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
}

fn format_err(path: &Path, reason: impl Into<String>) -> DatasetError {
    DatasetError::Format {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_images(path: &Path, bytes: &[u8]) -> Result<Vec<u8>, DatasetError> {
    let header = |offset| read_u32(bytes, offset).ok_or_else(|| format_err(path, "truncated header"));
    let magic = header(0)?;
    if magic != IMAGES_MAGIC {
        return Err(format_err(
            path,
            format!("magic {magic}, expected {IMAGES_MAGIC}"),
        ));
    }
    let count = header(4)? as usize;
    let rows = header(8)? as usize;
    let cols = header(12)? as usize;
    if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
        return Err(format_err(
            path,
            format!("images are {rows}x{cols}, expected {IMAGE_SIDE}x{IMAGE_SIDE}"),
        ));
    }
    let payload = &bytes[16..];
    if payload.len() != count * IMAGE_PIXELS {
        return Err(format_err(
            path,
            format!(
                "{} pixel bytes for {count} images, expected {}",
                payload.len(),
                count * IMAGE_PIXELS
            ),
        ));
    }
    Ok(payload.to_vec())
}

fn parse_labels(path: &Path, bytes: &[u8]) -> Result<Vec<u8>, DatasetError> {
    let header = |offset| read_u32(bytes, offset).ok_or_else(|| format_err(path, "truncated header"));
    let magic = header(0)?;
    if magic != LABELS_MAGIC {
        return Err(format_err(
            path,
            format!("magic {magic}, expected {LABELS_MAGIC}"),
        ));
    }
    let count = header(4)? as usize;
    let payload = &bytes[8..];
    if payload.len() != count {
        return Err(format_err(
            path,
            format!("{} label bytes, header says {count}", payload.len()),
        ));
    }
    if let Some(bad) = payload.iter().find(|&&label| label as usize >= NUM_CLASSES) {
        return Err(format_err(path, format!("label {bad} out of range")));
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn images_file(count: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in [IMAGES_MAGIC, count as u32, IMAGE_SIDE as u32, IMAGE_SIDE as u32] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        for i in 0..count {
            bytes.extend(std::iter::repeat_n((i * 20) as u8, IMAGE_PIXELS));
        }
        bytes
    }

    fn labels_file(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    fn write_dataset(dir: &Path) {
        std::fs::write(dir.join(TRAIN_IMAGES_FILE), images_file(4)).unwrap();
        std::fs::write(dir.join(TRAIN_LABELS_FILE), labels_file(&[0, 1, 2, 3])).unwrap();
        std::fs::write(dir.join(TEST_IMAGES_FILE), images_file(2)).unwrap();
        std::fs::write(dir.join(TEST_LABELS_FILE), labels_file(&[8, 9])).unwrap();
    }

    #[test]
    fn reads_train_and_test_splits() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        let mut provider = IdxProvider::open(dir.path(), 5).unwrap();

        let train = provider.next_train_batch(4).unwrap();
        let mut seen: Vec<usize> = (0..4).map(|row| train.class_of(row)).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        for row in 0..4 {
            let expected = (train.class_of(row) * 20) as f32 / 255.0;
            assert!((train.image(row)[100] - expected).abs() < 1e-6);
        }

        let test = provider.next_test_batch(3).unwrap();
        assert_eq!(test.len(), 3);
        assert!((0..3).all(|row| test.class_of(row) >= 8));
    }

    #[test]
    fn rejects_wrong_magic() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        let mut bytes = images_file(4);
        bytes[3] = 0x02;
        std::fs::write(dir.path().join(TRAIN_IMAGES_FILE), bytes).unwrap();
        let err = IdxProvider::open(dir.path(), 0).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn rejects_truncated_payload() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        let mut bytes = images_file(2);
        bytes.truncate(bytes.len() - 1);
        std::fs::write(dir.path().join(TEST_IMAGES_FILE), bytes).unwrap();
        assert!(matches!(
            IdxProvider::open(dir.path(), 0),
            Err(DatasetError::Format { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_label() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        std::fs::write(dir.path().join(TEST_LABELS_FILE), labels_file(&[8, 12])).unwrap();
        let err = IdxProvider::open(dir.path(), 0).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn rejects_short_header() {
        let dir = tempdir().unwrap();
        write_dataset(dir.path());
        std::fs::write(dir.path().join(TRAIN_LABELS_FILE), [0u8, 0, 8]).unwrap();
        let err = IdxProvider::open(dir.path(), 0).unwrap_err();
        assert!(err.to_string().contains("truncated header"));
    }
}
