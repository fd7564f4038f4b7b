//! The record every dataset factory returns.

use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::prelude::*;
use lab_core::{LoaderConfig, Result};
use tracing::debug;

use crate::burn_dataset::{ImageBatch, ImageBatcher, ImageItem};

/// A Burn data loader together with the settings it was built from
#[derive(Clone)]
pub struct DataSource<B: Backend> {
    loader: Arc<dyn DataLoader<ImageBatch<B>>>,
    config: LoaderConfig,
    num_items: usize,
}

impl<B: Backend> DataSource<B> {
    /// Wraps `dataset` in a loader configured by `config`.
    ///
    /// `seed` only matters when `config.shuffle` is set. Pinned memory has
    /// no Burn counterpart and is only recorded.
    pub fn new<D>(dataset: D, config: LoaderConfig, seed: u64, device: &B::Device) -> Result<Self>
    where
        D: Dataset<ImageItem> + 'static,
    {
        config.validate()?;
        let num_items = dataset.len();

        let builder = DataLoaderBuilder::new(ImageBatcher::<B>::new(device.clone()))
            .batch_size(config.batch_size);
        // Zero workers loads on the calling thread
        let builder = if config.num_workers > 0 {
            builder.num_workers(config.num_workers)
        } else {
            builder
        };
        let builder = if config.shuffle {
            builder.shuffle(seed)
        } else {
            builder
        };

        debug!(
            "Built loader over {} items: batch_size={}, workers={}, shuffle={}",
            num_items, config.batch_size, config.num_workers, config.shuffle
        );

        Ok(Self {
            loader: builder.build(dataset),
            config,
            num_items,
        })
    }

    pub fn loader(&self) -> Arc<dyn DataLoader<ImageBatch<B>>> {
        Arc::clone(&self.loader)
    }

    /// Iterates one epoch of batches
    pub fn iter(&self) -> Box<dyn burn::data::dataloader::DataLoaderIterator<ImageBatch<B>> + '_> {
        self.loader.iter()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    pub fn shuffle(&self) -> bool {
        self.config.shuffle
    }

    pub fn pin_memory(&self) -> bool {
        self.config.pin_memory
    }

    /// Items in the underlying dataset
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Batches per epoch, counting a trailing partial batch
    pub fn num_batches(&self) -> usize {
        self.num_items.div_ceil(self.config.batch_size)
    }
}

impl<B: Backend> std::fmt::Debug for DataSource<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("config", &self.config)
            .field("num_items", &self.num_items)
            .finish_non_exhaustive()
    }
}

/// Train and test loaders plus the metadata downstream training needs.
///
/// Built once by a factory and read through accessors only.
#[derive(Clone, Debug)]
pub struct DataBundle<B: Backend> {
    dataset_name: String,
    train_dataset: DataSource<B>,
    test_dataset: DataSource<B>,
    cardinality: usize,
    output_resolution: u32,
    is_classifier: bool,
}

impl<B: Backend> DataBundle<B> {
    pub fn new(
        dataset_name: impl Into<String>,
        train_dataset: DataSource<B>,
        test_dataset: DataSource<B>,
        cardinality: usize,
        output_resolution: u32,
        is_classifier: bool,
    ) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            train_dataset,
            test_dataset,
            cardinality,
            output_resolution,
            is_classifier,
        }
    }

    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    pub fn train_dataset(&self) -> &DataSource<B> {
        &self.train_dataset
    }

    pub fn test_dataset(&self) -> &DataSource<B> {
        &self.test_dataset
    }

    /// Number of classes
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    /// Side length of the square images in every batch
    pub fn output_resolution(&self) -> u32 {
        self.output_resolution
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::data::dataset::InMemDataset;
    use crate::transforms::ImageTensor;

    type TestBackend = NdArray<f32>;

    fn items(n: usize) -> InMemDataset<ImageItem> {
        let items = (0..n)
            .map(|i| {
                let tensor = ImageTensor::new(vec![i as f32; 3 * 2 * 2], 3, 2, 2).unwrap();
                ImageItem::new(tensor, i % 3, format!("item-{i}"))
            })
            .collect();
        InMemDataset::new(items)
    }

    #[test]
    fn test_source_batches() {
        let device = Default::default();
        let source = DataSource::<TestBackend>::new(items(7), LoaderConfig::new(3, 0), 0, &device).unwrap();

        assert_eq!(source.num_items(), 7);
        assert_eq!(source.num_batches(), 3);

        let sizes: Vec<usize> = source.iter().map(|batch| batch.images.dims()[0]).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_unshuffled_order_is_stable() {
        let device = Default::default();
        let source = DataSource::<TestBackend>::new(items(4), LoaderConfig::new(4, 0), 0, &device).unwrap();

        let batch = source.iter().next().unwrap();
        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_shuffled_source_keeps_every_item() {
        let device = Default::default();
        let config = LoaderConfig::new(10, 0).with_shuffle(true);
        let source = DataSource::<TestBackend>::new(items(10), config, 7, &device).unwrap();
        assert!(source.shuffle());

        let total: usize = source.iter().map(|batch| batch.targets.dims()[0]).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_zero_and_multiple_workers_yield_the_same_items() {
        let device = Default::default();
        for workers in [0, 1, 3] {
            let source =
                DataSource::<TestBackend>::new(items(9), LoaderConfig::new(2, workers), 0, &device)
                    .unwrap();
            assert_eq!(source.num_workers(), workers);

            let mut targets: Vec<i64> = source
                .iter()
                .flat_map(|batch| batch.targets.into_data().to_vec::<i64>().unwrap())
                .collect();
            targets.sort();
            assert_eq!(targets, vec![0, 0, 0, 1, 1, 1, 2, 2, 2]);
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let device = Default::default();
        let result = DataSource::<TestBackend>::new(items(2), LoaderConfig::new(0, 0), 0, &device);
        assert!(result.is_err());
    }

    #[test]
    fn test_bundle_accessors() {
        let device = Default::default();
        let train = DataSource::<TestBackend>::new(
            items(4),
            LoaderConfig::new(2, 4).with_shuffle(true).with_pin_memory(true),
            42,
            &device,
        )
        .unwrap();
        let test = DataSource::<TestBackend>::new(items(2), LoaderConfig::new(2, 4), 43, &device).unwrap();

        let bundle = DataBundle::new("Food101", train, test, 101, 256, true);
        assert_eq!(bundle.dataset_name(), "Food101");
        assert_eq!(bundle.cardinality(), 101);
        assert_eq!(bundle.output_resolution(), 256);
        assert!(bundle.is_classifier());
        assert!(bundle.train_dataset().pin_memory());
        assert_eq!(bundle.train_dataset().num_workers(), 4);
        assert_eq!(bundle.test_dataset().num_items(), 2);
        assert!(!bundle.test_dataset().shuffle());
    }
}
