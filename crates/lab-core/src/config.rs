//! Configuration structures for dataset construction.

use crate::types::DatasetKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default mini-batch size for every dataset factory
pub const DEFAULT_BATCH_SIZE: usize = 12;

/// Default cache directory holding downloaded and extracted datasets
pub const DEFAULT_CACHE_DIR: &str = "tmp";

/// Default seed for epoch shuffling
pub const DEFAULT_SEED: u64 = 42;

/// Batching and parallelism settings handed to the data loader
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Samples per batch
    pub batch_size: usize,
    /// Number of worker threads used to load samples
    pub num_workers: usize,
    /// Whether the order is reshuffled every epoch
    pub shuffle: bool,
    /// Whether batches should be staged in page-locked host memory
    pub pin_memory: bool,
}

impl LoaderConfig {
    /// Creates a loader config that does not shuffle and does not pin memory
    pub fn new(batch_size: usize, num_workers: usize) -> Self {
        Self {
            batch_size,
            num_workers,
            shuffle: false,
            pin_memory: false,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_pin_memory(mut self, pin_memory: bool) -> Self {
        self.pin_memory = pin_memory;
        self
    }

    /// Validates the batch size
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Caller-facing parameters shared by all dataset factories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleOptions {
    /// Samples per batch for both loaders
    pub batch_size: usize,
    /// Output spatial resolution; `None` selects the dataset default
    pub output_size: Option<u32>,
    /// Directory holding cached datasets
    pub cache_dir: PathBuf,
    /// Overrides the dataset's default test-loader shuffling
    pub shuffle_test: Option<bool>,
    /// Overrides the dataset root derived from `cache_dir`
    pub root: Option<PathBuf>,
    /// Seed for epoch shuffling
    pub seed: u64,
    /// Whether missing files may be downloaded (MNIST only)
    pub download: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            output_size: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            shuffle_test: None,
            root: None,
            seed: DEFAULT_SEED,
            download: true,
        }
    }
}

impl BundleOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_output_size(mut self, output_size: u32) -> Self {
        self.output_size = Some(output_size);
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_shuffle_test(mut self, shuffle_test: bool) -> Self {
        self.shuffle_test = Some(shuffle_test);
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    /// Resolves the output size against a dataset default
    pub fn output_size_or(&self, default: u32) -> u32 {
        self.output_size.unwrap_or(default)
    }

    /// Checks the numeric parameters
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.output_size == Some(0) {
            return Err(Error::InvalidArgument(
                "output_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// File-backed configuration for the inspection tool and scripted runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabConfig {
    /// Directory holding cached datasets
    pub cache_dir: PathBuf,
    /// Samples per batch
    pub batch_size: usize,
    /// Seed for epoch shuffling
    pub seed: u64,
    /// Whether MNIST may be downloaded
    pub download: bool,
    /// Per-dataset root overrides, keyed by `DatasetKind::config_key`
    pub roots: HashMap<String, PathBuf>,
    /// Per-dataset output resolution overrides
    pub output_size: HashMap<String, u32>,
    /// Per-dataset test shuffling overrides
    pub shuffle_test: HashMap<String, bool>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            seed: DEFAULT_SEED,
            download: true,
            roots: HashMap::new(),
            output_size: HashMap::new(),
            shuffle_test: HashMap::new(),
        }
    }
}

impl LabConfig {
    /// Builds the factory options for one dataset
    pub fn options_for(&self, kind: DatasetKind) -> BundleOptions {
        let key = kind.config_key();
        BundleOptions {
            batch_size: self.batch_size,
            output_size: self.output_size.get(key).copied(),
            cache_dir: self.cache_dir.clone(),
            shuffle_test: self.shuffle_test.get(key).copied(),
            root: self.roots.get(key).cloned(),
            seed: self.seed,
            download: self.download,
        }
    }

    /// Rejects override tables that name unknown datasets
    pub fn validate(&self) -> Result<()> {
        let known: Vec<&str> = DatasetKind::ALL.iter().map(|k| k.config_key()).collect();
        let keys = self
            .roots
            .keys()
            .chain(self.output_size.keys())
            .chain(self.shuffle_test.keys());

        for key in keys {
            if !known.contains(&key.as_str()) {
                return Err(Error::Config(format!(
                    "Unknown dataset key '{key}', expected one of {known:?}"
                )));
            }
        }

        BundleOptions::default()
            .with_batch_size(self.batch_size)
            .validate()
    }
}
