//! MNIST handwritten digits read from the raw IDX files.
//!
//! Files live in `<root>/MNIST/raw`. Missing files are downloaded when the
//! dataset is created with `download = true`.

use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::{DynamicImage, GrayImage};
use lab_core::{DataSplit, Error, Result};
use tracing::info;

use crate::burn_dataset::{item_or_failure, ImageItem};
use crate::download::fetch_gzip;
use crate::transforms::Compose;

/// Mirrors tried in order
pub const MNIST_MIRRORS: [&str; 2] = [
    "https://ossci-datasets.s3.amazonaws.com/mnist/",
    "http://yann.lecun.com/exdb/mnist/",
];

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Digit names, indexed by label
pub const CLASS_NAMES: [&str; 10] = [
    "0 - zero",
    "1 - one",
    "2 - two",
    "3 - three",
    "4 - four",
    "5 - five",
    "6 - six",
    "7 - seven",
    "8 - eight",
    "9 - nine",
];

/// Decoded contents of an IDX image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<u8>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::Dataset("IDX header is truncated".to_string()))
}

/// Parses an IDX3 image file
pub fn parse_idx_images(bytes: &[u8]) -> Result<IdxImages> {
    let magic = read_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        return Err(Error::Dataset(format!(
            "Invalid IDX image magic number {magic}, expected {IMAGES_MAGIC}"
        )));
    }

    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;

    let pixels = &bytes[16..];
    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| Error::Dataset("IDX dimensions overflow".to_string()))?;
    if pixels.len() != expected {
        return Err(Error::Dataset(format!(
            "IDX image payload has {} bytes, expected {}",
            pixels.len(),
            expected
        )));
    }

    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels: pixels.to_vec(),
    })
}

/// Parses an IDX1 label file
pub fn parse_idx_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let magic = read_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        return Err(Error::Dataset(format!(
            "Invalid IDX label magic number {magic}, expected {LABELS_MAGIC}"
        )));
    }

    let count = read_u32(bytes, 4)? as usize;
    let labels = &bytes[8..];
    if labels.len() != count {
        return Err(Error::Dataset(format!(
            "IDX label payload has {} entries, expected {}",
            labels.len(),
            count
        )));
    }

    if let Some(bad) = labels.iter().find(|&&l| l as usize >= CLASS_NAMES.len()) {
        return Err(Error::Dataset(format!("IDX label {bad} is not a digit")));
    }

    Ok(labels.to_vec())
}

/// MNIST split backed by in-memory pixel data
#[derive(Debug, Clone)]
pub struct Mnist {
    images: IdxImages,
    labels: Vec<u8>,
    split: DataSplit,
    transform: Compose,
}

impl Mnist {
    /// Opens a split, downloading the raw files first when allowed
    pub fn new(root: impl AsRef<Path>, split: DataSplit, download: bool, transform: Compose) -> Result<Self> {
        let (images_file, labels_file) = Self::files_for(split)?;
        let raw_dir = Self::raw_dir(root.as_ref());

        if !Self::check_exists(root.as_ref(), split)? {
            if !download {
                return Err(Error::NotFound(format!(
                    "MNIST {} files not found in {}. Enable download to fetch them",
                    split,
                    raw_dir.display()
                )));
            }
            Self::download(root.as_ref())?;
        }

        let images = parse_idx_images(&fs::read(raw_dir.join(images_file))?)?;
        let labels = parse_idx_labels(&fs::read(raw_dir.join(labels_file))?)?;

        if images.count != labels.len() {
            return Err(Error::Dataset(format!(
                "MNIST {} has {} images but {} labels",
                split,
                images.count,
                labels.len()
            )));
        }

        info!(
            "Loaded MNIST {} split: {} images of {}x{}",
            split, images.count, images.rows, images.cols
        );

        Ok(Self {
            images,
            labels,
            split,
            transform,
        })
    }

    /// Directory holding the raw IDX files
    pub fn raw_dir(root: &Path) -> PathBuf {
        root.join("MNIST").join("raw")
    }

    fn files_for(split: DataSplit) -> Result<(&'static str, &'static str)> {
        match split {
            DataSplit::Train => Ok((TRAIN_IMAGES, TRAIN_LABELS)),
            DataSplit::Test => Ok((TEST_IMAGES, TEST_LABELS)),
            DataSplit::Validation => Err(Error::InvalidArgument(
                "MNIST only has train and test splits".to_string(),
            )),
        }
    }

    /// Whether both files of a split are present
    pub fn check_exists(root: &Path, split: DataSplit) -> Result<bool> {
        let (images_file, labels_file) = Self::files_for(split)?;
        let raw_dir = Self::raw_dir(root);
        Ok(raw_dir.join(images_file).is_file() && raw_dir.join(labels_file).is_file())
    }

    /// Fetches all four raw files
    pub fn download(root: &Path) -> Result<()> {
        let raw_dir = Self::raw_dir(root);
        for file in [TRAIN_IMAGES, TRAIN_LABELS, TEST_IMAGES, TEST_LABELS] {
            fetch_gzip(&MNIST_MIRRORS, file, &raw_dir)?;
        }
        Ok(())
    }

    pub fn split(&self) -> DataSplit {
        self.split
    }

    pub fn num_classes(&self) -> usize {
        CLASS_NAMES.len()
    }

    pub fn transform(&self) -> &Compose {
        &self.transform
    }

    /// Raw grayscale image and label
    pub fn image(&self, index: usize) -> Option<(GrayImage, usize)> {
        let size = self.images.rows * self.images.cols;
        let pixels = self.images.pixels.get(index * size..(index + 1) * size)?;
        let image = GrayImage::from_raw(
            self.images.cols as u32,
            self.images.rows as u32,
            pixels.to_vec(),
        )?;
        Some((image, self.labels[index] as usize))
    }

    /// Transforms one sample, returning the error on failure
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        let (image, label) = self.image(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Index {} out of range for {} samples",
                index,
                self.labels.len()
            ))
        })?;

        let tensor = self
            .transform
            .apply(DynamicImage::ImageLuma8(image), &mut rand::thread_rng())?;

        Ok(ImageItem::new(
            tensor,
            label,
            format!("mnist/{}/{}", self.split, index),
        ))
    }
}

impl Dataset<ImageItem> for Mnist {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let label = *self.labels.get(index)?;
        Some(item_or_failure(self.try_get(index), label as usize, || {
            format!("mnist/{}/{}", self.split, index)
        }))
    }

    fn len(&self) -> usize {
        self.labels.len()
    }
}
