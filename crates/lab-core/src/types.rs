//! Core type definitions shared by the dataset helpers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::Error;

/// Represents an image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label (index)
    pub label: usize,
    /// Optional class name
    pub class_name: Option<String>,
}

impl ImageSample {
    /// Creates a new image sample with class name
    pub fn with_class_name(path: PathBuf, label: usize, class_name: impl Into<String>) -> Self {
        Self {
            path,
            label,
            class_name: Some(class_name.into()),
        }
    }
}

/// Data split type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataSplit {
    /// Training data
    Train,
    /// Validation data
    Validation,
    /// Test data
    Test,
}

impl DataSplit {
    /// Whether samples from this split receive training augmentation
    pub fn is_train(&self) -> bool {
        matches!(self, DataSplit::Train)
    }
}

impl std::fmt::Display for DataSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSplit::Train => write!(f, "train"),
            DataSplit::Validation => write!(f, "validation"),
            DataSplit::Test => write!(f, "test"),
        }
    }
}

impl FromStr for DataSplit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(DataSplit::Train),
            "val" | "validation" => Ok(DataSplit::Validation),
            "test" => Ok(DataSplit::Test),
            other => Err(Error::InvalidArgument(format!("Unknown split: {other}"))),
        }
    }
}

/// The datasets a bundle can be built for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Food-101, 101 dishes
    Food101,
    /// Tiny ImageNet, 200 classes of 64x64 images
    TinyImageNet,
    /// MNIST handwritten digits
    Mnist,
    /// ILSVRC-2012 ImageNet
    ImageNet,
    /// Food-101 downsampled to 32px and upscaled again
    TinyResizedFood101,
}

impl DatasetKind {
    /// All supported datasets, in registry order.
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Food101,
        DatasetKind::TinyImageNet,
        DatasetKind::Mnist,
        DatasetKind::ImageNet,
        DatasetKind::TinyResizedFood101,
    ];

    /// Name reported in the bundle
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Food101 => "Food101",
            DatasetKind::TinyImageNet => "TinyImageNet",
            DatasetKind::Mnist => "MNIST",
            DatasetKind::ImageNet => "ImageNet",
            DatasetKind::TinyResizedFood101 => "TinyResizedFood101",
        }
    }

    /// Number of classes
    pub fn cardinality(&self) -> usize {
        match self {
            DatasetKind::Food101 | DatasetKind::TinyResizedFood101 => 101,
            DatasetKind::TinyImageNet => 200,
            DatasetKind::Mnist => 10,
            DatasetKind::ImageNet => 1000,
        }
    }

    /// Output resolution used when the caller does not pick one
    pub fn default_output_size(&self) -> u32 {
        match self {
            DatasetKind::Food101 | DatasetKind::TinyResizedFood101 => 256,
            DatasetKind::TinyImageNet => 64,
            DatasetKind::Mnist => 28,
            DatasetKind::ImageNet => 224,
        }
    }

    /// Snake-case key used in configuration tables
    pub fn config_key(&self) -> &'static str {
        match self {
            DatasetKind::Food101 => "food101",
            DatasetKind::TinyImageNet => "tiny_imagenet",
            DatasetKind::Mnist => "mnist",
            DatasetKind::ImageNet => "imagenet",
            DatasetKind::TinyResizedFood101 => "tiny_resized_food101",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "food101" => Ok(DatasetKind::Food101),
            "tinyimagenet" => Ok(DatasetKind::TinyImageNet),
            "mnist" => Ok(DatasetKind::Mnist),
            "imagenet" => Ok(DatasetKind::ImageNet),
            "tinyresizedfood101" => Ok(DatasetKind::TinyResizedFood101),
            _ => Err(Error::InvalidArgument(format!("Unknown dataset: {s}"))),
        }
    }
}
