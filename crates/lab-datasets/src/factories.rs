//! One factory per dataset, each returning a [`DataBundle`].
//!
//! Every factory builds its train and test pipelines, opens both splits,
//! wraps them in loaders and reports the dataset metadata.

use std::path::PathBuf;

use burn::prelude::*;
use lab_core::{BundleOptions, DataSplit, DatasetKind, LoaderConfig, Result};
use tracing::{info, warn};

use crate::bundle::{DataBundle, DataSource};
use crate::folder::ImageFolder;
use crate::mnist::Mnist;
use crate::transforms::{
    ColorJitter, Compose, Lighting, Transform, CIFAR_MEAN, CIFAR_STD, IMAGENET_MEAN, IMAGENET_STD,
};

/// Resolution Food-101 images are squeezed through in the tiny variant
pub const TINY_FOOD_SIZE: u32 = 32;

/// Side length of Tiny ImageNet images
pub const TINY_IMAGENET_SIZE: u32 = 64;

/// Side length of MNIST digits
pub const MNIST_SIZE: u32 = 28;

/// Standard deviation of the ImageNet PCA lighting noise
pub const IMAGENET_LIGHTING_STD: f32 = 0.1;

/// Train and test pipelines of one dataset
pub type Pipelines = (Compose, Compose);

/// Food-101 pipelines at output size `s`
pub fn food101_pipelines(s: u32) -> Result<Pipelines> {
    let train = Compose::new(vec![
        Transform::Resize(s),
        Transform::random_crop(s, s / 8),
        Transform::horizontal_flip(),
        Transform::ToTensor,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    let test = Compose::new(vec![
        Transform::Resize(s),
        Transform::CenterCrop(s),
        Transform::ToTensor,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    Ok((train, test))
}

/// Tiny ImageNet pipelines; the train crop works at the native 64px
pub fn tiny_imagenet_pipelines(s: u32) -> Result<Pipelines> {
    let train = Compose::new(vec![
        Transform::random_crop(TINY_IMAGENET_SIZE, 8),
        Transform::horizontal_flip(),
        Transform::Resize(s),
        Transform::ToTensor,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    let test = Compose::new(vec![
        Transform::Resize(s),
        Transform::ToTensor,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    Ok((train, test))
}

/// MNIST pipelines; digits are replicated to three channels
pub fn mnist_pipelines(s: u32) -> Result<Pipelines> {
    let train = Compose::new(vec![
        Transform::random_crop(MNIST_SIZE, 3),
        Transform::horizontal_flip(),
        Transform::Resize(s),
        Transform::ToTensor,
        Transform::GrayToRgb,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    let test = Compose::new(vec![
        Transform::Resize(s),
        Transform::ToTensor,
        Transform::GrayToRgb,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    Ok((train, test))
}

/// ImageNet pipelines with color jitter and PCA lighting on the train side
pub fn imagenet_pipelines(s: u32) -> Result<Pipelines> {
    let train = Compose::new(vec![
        Transform::Resize(s),
        Transform::CenterCrop(s),
        Transform::horizontal_flip(),
        Transform::ColorJitter(ColorJitter::new(0.4, 0.4, 0.4)),
        Transform::ToTensor,
        Transform::Lighting(Lighting::imagenet(IMAGENET_LIGHTING_STD)),
        Transform::normalize(IMAGENET_MEAN, IMAGENET_STD),
    ])?;
    let test = Compose::new(vec![
        Transform::Resize(imagenet_test_resize(s)),
        Transform::CenterCrop(s),
        Transform::ToTensor,
        Transform::normalize(IMAGENET_MEAN, IMAGENET_STD),
    ])?;
    Ok((train, test))
}

/// Resize applied before the evaluation center crop, `floor(s * 1.14)`
pub fn imagenet_test_resize(s: u32) -> u32 {
    (f64::from(s) * 1.14).floor() as u32
}

/// Food-101 pipelines that first squeeze images down to 32px
pub fn tiny_resized_food101_pipelines(s: u32) -> Result<Pipelines> {
    let train = Compose::new(vec![
        Transform::Resize(TINY_FOOD_SIZE),
        Transform::Resize(s),
        Transform::random_crop(s, s / 8),
        Transform::horizontal_flip(),
        Transform::ToTensor,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    let test = Compose::new(vec![
        Transform::Resize(TINY_FOOD_SIZE),
        Transform::Resize(s),
        Transform::CenterCrop(s),
        Transform::ToTensor,
        Transform::normalize(CIFAR_MEAN, CIFAR_STD),
    ])?;
    Ok((train, test))
}

/// Pipelines for any dataset by kind
pub fn pipelines_for(kind: DatasetKind, s: u32) -> Result<Pipelines> {
    match kind {
        DatasetKind::Food101 => food101_pipelines(s),
        DatasetKind::TinyImageNet => tiny_imagenet_pipelines(s),
        DatasetKind::Mnist => mnist_pipelines(s),
        DatasetKind::ImageNet => imagenet_pipelines(s),
        DatasetKind::TinyResizedFood101 => tiny_resized_food101_pipelines(s),
    }
}

/// Directory holding a dataset's splits
pub fn dataset_root(kind: DatasetKind, options: &BundleOptions) -> PathBuf {
    if let Some(root) = &options.root {
        return root.clone();
    }
    let cache = &options.cache_dir;
    match kind {
        DatasetKind::Food101 | DatasetKind::TinyResizedFood101 => {
            cache.join("Food_101_Dataset").join("food-101")
        }
        DatasetKind::TinyImageNet => cache.join("tiny-imagenet-200"),
        DatasetKind::Mnist => cache.clone(),
        DatasetKind::ImageNet => cache.join("imagenet"),
    }
}

/// Directory of one split of a folder-backed dataset
pub fn split_dir(kind: DatasetKind, options: &BundleOptions, split: DataSplit) -> PathBuf {
    let root = dataset_root(kind, options);
    match (kind, split.is_train()) {
        (_, true) => root.join("train"),
        (DatasetKind::TinyImageNet, false) => root.join("val").join("ds"),
        (DatasetKind::ImageNet, false) => root.join("val"),
        (_, false) => root.join("test"),
    }
}

/// Per-dataset loader settings
struct LoaderPlan {
    num_workers: usize,
    pin_memory: bool,
    shuffle_test: bool,
}

impl LoaderPlan {
    fn for_kind(kind: DatasetKind, options: &BundleOptions) -> Self {
        let (num_workers, pin_memory, shuffle_test) = match kind {
            DatasetKind::Food101 => (4, true, false),
            DatasetKind::TinyImageNet => (3, false, true),
            DatasetKind::Mnist => (3, false, false),
            DatasetKind::ImageNet => (6, false, false),
            DatasetKind::TinyResizedFood101 => (4, true, false),
        };
        Self {
            num_workers,
            pin_memory,
            shuffle_test: options.shuffle_test.unwrap_or(shuffle_test),
        }
    }

    fn train(&self, batch_size: usize) -> LoaderConfig {
        LoaderConfig::new(batch_size, self.num_workers)
            .with_shuffle(true)
            .with_pin_memory(self.pin_memory)
    }

    fn test(&self, batch_size: usize) -> LoaderConfig {
        LoaderConfig::new(batch_size, self.num_workers)
            .with_shuffle(self.shuffle_test)
            .with_pin_memory(self.pin_memory)
    }
}

fn warn_on_class_mismatch(kind: DatasetKind, split: DataSplit, found: usize) {
    if found != kind.cardinality() {
        warn!(
            "{} {} split has {} classes, expected {}",
            kind,
            split,
            found,
            kind.cardinality()
        );
    }
}

fn folder_bundle<B: Backend>(
    kind: DatasetKind,
    pipelines: impl FnOnce(u32) -> Result<Pipelines>,
    options: &BundleOptions,
    device: &B::Device,
) -> Result<DataBundle<B>> {
    options.validate()?;
    let size = options.output_size_or(kind.default_output_size());
    let (train_transform, test_transform) = pipelines(size)?;

    info!("Building {} bundle at {}px", kind, size);
    info!("Train pipeline: {}", train_transform);
    info!("Test pipeline: {}", test_transform);

    let train = ImageFolder::new(split_dir(kind, options, DataSplit::Train), train_transform)?;
    let test = ImageFolder::new(split_dir(kind, options, DataSplit::Test), test_transform)?;
    warn_on_class_mismatch(kind, DataSplit::Train, train.num_classes());
    warn_on_class_mismatch(kind, DataSplit::Test, test.num_classes());

    let plan = LoaderPlan::for_kind(kind, options);
    let train_source = DataSource::new(train, plan.train(options.batch_size), options.seed, device)?;
    let test_source = DataSource::new(test, plan.test(options.batch_size), options.seed.wrapping_add(1), device)?;

    info!(
        "{} bundle ready: {} train / {} test items",
        kind,
        train_source.num_items(),
        test_source.num_items()
    );

    Ok(DataBundle::new(
        kind.name(),
        train_source,
        test_source,
        kind.cardinality(),
        size,
        true,
    ))
}

/// Food-101 from `<cache>/Food_101_Dataset/food-101/{train,test}`
pub fn food101<B: Backend>(options: &BundleOptions, device: &B::Device) -> Result<DataBundle<B>> {
    folder_bundle(DatasetKind::Food101, food101_pipelines, options, device)
}

/// Tiny ImageNet from `<cache>/tiny-imagenet-200/{train,val/ds}`
pub fn tiny_imagenet<B: Backend>(
    options: &BundleOptions,
    device: &B::Device,
) -> Result<DataBundle<B>> {
    folder_bundle(DatasetKind::TinyImageNet, tiny_imagenet_pipelines, options, device)
}

/// ImageNet from `<root>/{train,val}`, root defaulting to `<cache>/imagenet`
pub fn imagenet<B: Backend>(options: &BundleOptions, device: &B::Device) -> Result<DataBundle<B>> {
    folder_bundle(DatasetKind::ImageNet, imagenet_pipelines, options, device)
}

/// Food-101 reduced to 32px and upscaled back to the output size
pub fn tiny_resized_food101<B: Backend>(
    options: &BundleOptions,
    device: &B::Device,
) -> Result<DataBundle<B>> {
    folder_bundle(
        DatasetKind::TinyResizedFood101,
        tiny_resized_food101_pipelines,
        options,
        device,
    )
}

/// MNIST from `<cache>/MNIST/raw`, downloaded when missing
pub fn mnist<B: Backend>(options: &BundleOptions, device: &B::Device) -> Result<DataBundle<B>> {
    let kind = DatasetKind::Mnist;
    options.validate()?;
    let size = options.output_size_or(kind.default_output_size());
    let (train_transform, test_transform) = mnist_pipelines(size)?;

    info!("Building {} bundle at {}px", kind, size);

    let root = dataset_root(kind, options);
    let train = Mnist::new(&root, DataSplit::Train, options.download, train_transform)?;
    let test = Mnist::new(&root, DataSplit::Test, options.download, test_transform)?;

    let plan = LoaderPlan::for_kind(kind, options);
    let train_source = DataSource::new(train, plan.train(options.batch_size), options.seed, device)?;
    let test_source = DataSource::new(test, plan.test(options.batch_size), options.seed.wrapping_add(1), device)?;

    info!(
        "{} bundle ready: {} train / {} test items",
        kind,
        train_source.num_items(),
        test_source.num_items()
    );

    Ok(DataBundle::new(
        kind.name(),
        train_source,
        test_source,
        kind.cardinality(),
        size,
        true,
    ))
}

/// Builds the bundle of any dataset by kind
pub fn build_bundle<B: Backend>(
    kind: DatasetKind,
    options: &BundleOptions,
    device: &B::Device,
) -> Result<DataBundle<B>> {
    match kind {
        DatasetKind::Food101 => food101(options, device),
        DatasetKind::TinyImageNet => tiny_imagenet(options, device),
        DatasetKind::Mnist => mnist(options, device),
        DatasetKind::ImageNet => imagenet(options, device),
        DatasetKind::TinyResizedFood101 => tiny_resized_food101(options, device),
    }
}
