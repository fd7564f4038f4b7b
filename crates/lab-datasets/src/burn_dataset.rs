//! Burn integration: dataset items, batches and the batcher.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use lab_core::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::transforms::ImageTensor;

/// A single transformed sample ready for batching.
///
/// A sample that failed to load still yields an item, with `error` set and
/// no image data, so the loader keeps going and the batcher drops it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageItem {
    /// Image data as flattened CHW float array
    pub image: Vec<f32>,
    /// Shape of `image` as `[channels, height, width]`
    pub shape: [usize; 3],
    /// Class label
    pub label: usize,
    /// Where the sample came from (file path or archive index)
    pub source: String,
    /// Why the sample could not be loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageItem {
    pub fn new(tensor: ImageTensor, label: usize, source: impl Into<String>) -> Self {
        let shape = tensor.shape();
        Self {
            image: tensor.into_data(),
            shape,
            label,
            source: source.into(),
            error: None,
        }
    }

    /// Placeholder for a sample that failed to load
    pub fn failed(label: usize, source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            image: Vec::new(),
            shape: [0, 0, 0],
            label,
            source: source.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Turns a load result into an item, keeping failures as placeholders
pub(crate) fn item_or_failure(
    result: Result<ImageItem>,
    label: usize,
    source: impl FnOnce() -> String,
) -> ImageItem {
    result.unwrap_or_else(|e| ImageItem::failed(label, source(), e.to_string()))
}

/// A batch of images for training or evaluation
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks transformed items into tensors on a device.
///
/// Normalization happens in the transform pipeline, so the batcher only
/// stacks.
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let (failed, loaded): (Vec<_>, Vec<_>) =
            items.into_iter().partition(ImageItem::is_failed);
        for item in &failed {
            warn!(
                "Skipping {}: {}",
                item.source,
                item.error.as_deref().unwrap_or("unknown error")
            );
        }

        let shape = loaded.first().map(|item| item.shape).unwrap_or([3, 0, 0]);

        let (kept, dropped): (Vec<_>, Vec<_>) =
            loaded.into_iter().partition(|item| item.shape == shape);
        for item in &dropped {
            warn!(
                "Dropping {} from batch: shape {:?} differs from {:?}",
                item.source, item.shape, shape
            );
        }

        let batch_size = kept.len();
        let [channels, height, width] = shape;

        let images_data: Vec<f32> = kept
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            &self.device,
        );

        let targets_data: Vec<i64> = kept.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn item(label: usize, shape: [usize; 3], value: f32) -> ImageItem {
        let [c, h, w] = shape;
        let tensor = ImageTensor::new(vec![value; c * h * w], c, h, w).unwrap();
        ImageItem::new(tensor, label, format!("item-{label}"))
    }

    #[test]
    fn test_item_from_tensor() {
        let item = item(4, [3, 2, 2], 0.5);
        assert_eq!(item.shape, [3, 2, 2]);
        assert_eq!(item.image.len(), 12);
        assert_eq!(item.label, 4);
        assert_eq!(item.source, "item-4");
    }

    #[test]
    fn test_batcher_stacks_items() {
        let device = Default::default();
        let batcher = ImageBatcher::<TestBackend>::new(device);

        let batch = batcher.batch(vec![
            item(0, [3, 4, 4], 0.1),
            item(1, [3, 4, 4], 0.2),
            item(7, [3, 4, 4], 0.3),
        ]);

        assert_eq!(batch.images.dims(), [3, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [3]);

        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1, 7]);
    }

    #[test]
    fn test_batcher_drops_mismatched_shapes() {
        let device = Default::default();
        let batcher = ImageBatcher::<TestBackend>::new(device);

        let batch = batcher.batch(vec![
            item(0, [3, 4, 4], 0.1),
            item(1, [3, 5, 4], 0.2),
            item(2, [3, 4, 4], 0.3),
        ]);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
    }

    #[test]
    fn test_batcher_drops_failed_items() {
        let device = Default::default();
        let batcher = ImageBatcher::<TestBackend>::new(device);

        let batch = batcher.batch(vec![
            ImageItem::failed(0, "a/broken.jpg", "Failed to decode"),
            item(1, [3, 4, 4], 0.2),
            item(2, [3, 4, 4], 0.3),
        ]);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        let targets: Vec<i64> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![1, 2]);
    }

    #[test]
    fn test_failed_item_result() {
        let result: Result<ImageItem> = Err(lab_core::Error::Image("bad header".to_string()));
        let item = item_or_failure(result, 3, || "b/img.jpg".to_string());
        assert!(item.is_failed());
        assert_eq!(item.label, 3);
        assert_eq!(item.source, "b/img.jpg");
        assert!(item.error.unwrap().contains("bad header"));
    }
}
