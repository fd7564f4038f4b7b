//! Class-per-directory image datasets.
//!
//! The root holds one directory per class:
//! ```text
//! root/
//! ├── apple_pie/
//! │   ├── 1005649.jpg
//! │   └── ...
//! ├── baby_back_ribs/
//! │   └── ...
//! └── ...
//! ```
//! Images may sit at any depth below their class directory, which covers
//! layouts like `n01443537/images/n01443537_0.JPEG`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::{DynamicImage, ImageReader};
use lab_core::{Error, ImageSample, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::burn_dataset::{item_or_failure, ImageItem};
use crate::transforms::Compose;

/// File extensions accepted as images
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// Whether a path has one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Sorted class directory names under `root`
pub fn find_classes(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!(
            "Dataset directory not found: {}",
            root.display()
        )));
    }

    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            classes.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    classes.sort();

    if classes.is_empty() {
        return Err(Error::NotFound(format!(
            "Couldn't find any class folder in {}",
            root.display()
        )));
    }

    Ok(classes)
}

/// Collects every image below each class directory, labelled by class index
pub fn make_samples(root: &Path, classes: &[String]) -> Result<Vec<ImageSample>> {
    let mut samples = Vec::new();
    let mut empty_classes = Vec::new();

    for (label, class_name) in classes.iter().enumerate() {
        let class_dir = root.join(class_name);

        let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
            .min_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());

        if paths.is_empty() {
            empty_classes.push(class_name.clone());
        }

        samples.extend(
            paths
                .into_iter()
                .map(|path| ImageSample::with_class_name(path, label, class_name.clone())),
        );
    }

    if !empty_classes.is_empty() {
        return Err(Error::NotFound(format!(
            "Found no valid file for the classes {}. Supported extensions are: {}",
            empty_classes.join(", "),
            IMAGE_EXTENSIONS.join(", ")
        )));
    }

    Ok(samples)
}

/// Lazily decoded image folder with a transform pipeline
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
    transform: Compose,
}

impl ImageFolder {
    /// Scans `root` for class directories and their images
    pub fn new(root: impl AsRef<Path>, transform: Compose) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading image folder from: {:?}", root);

        let classes = find_classes(&root)?;
        let samples = make_samples(&root, &classes)?;

        info!(
            "Found {} classes, {} samples in {:?}",
            classes.len(),
            samples.len(),
            root
        );

        Ok(Self {
            root,
            classes,
            samples,
            transform,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Class names, indexed by label
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn transform(&self) -> &Compose {
        &self.transform
    }

    /// Mapping from class name to label
    pub fn class_to_idx(&self) -> HashMap<String, usize> {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect()
    }

    /// Number of samples per label
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Decodes a sample as RGB without applying the pipeline
    pub fn load_image(&self, sample: &ImageSample) -> Result<DynamicImage> {
        let img = ImageReader::open(&sample.path)
            .map_err(|e| Error::Image(format!("Failed to open {}: {}", sample.path.display(), e)))?
            .with_guessed_format()?
            .decode()
            .map_err(|e| {
                Error::Image(format!("Failed to decode {}: {}", sample.path.display(), e))
            })?;

        Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
    }

    /// Loads and transforms one sample, returning the error on failure
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        let sample = self.samples.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        })?;

        let image = self.load_image(sample)?;
        let tensor = self.transform.apply(image, &mut rand::thread_rng())?;

        Ok(ImageItem::new(
            tensor,
            sample.label,
            sample.path.to_string_lossy(),
        ))
    }
}

impl Dataset<ImageItem> for ImageFolder {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        Some(item_or_failure(self.try_get(index), sample.label, || {
            sample.path.to_string_lossy().into_owned()
        }))
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transforms::Transform;
    use image::{ImageBuffer, Rgb};
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn create_test_image(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90u8])
        });
        img.save(path).unwrap();
    }

    /// Writes `root/<class>/img<i>.png` for every class
    pub(crate) fn create_image_folder(root: &Path, classes: &[&str], per_class: usize, size: (u32, u32)) {
        for class in classes {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                create_test_image(&dir.join(format!("img{i}.png")), size.0, size.1);
            }
        }
    }

    fn to_tensor_only() -> Compose {
        Compose::new(vec![Transform::ToTensor]).unwrap()
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/b.JPEG")));
        assert!(is_image_file(Path::new("x.png")));
        assert!(is_image_file(Path::new("x.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_classes_are_sorted() {
        let temp_dir = TempDir::new().unwrap();
        create_image_folder(temp_dir.path(), &["waffles", "apple_pie", "ramen"], 1, (8, 8));

        let folder = ImageFolder::new(temp_dir.path(), to_tensor_only()).unwrap();
        assert_eq!(folder.classes(), &["apple_pie", "ramen", "waffles"]);
        assert_eq!(folder.class_to_idx()["waffles"], 2);
        assert_eq!(folder.len(), 3);
    }

    #[test]
    fn test_nested_images_are_found() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("n01443537").join("images");
        fs::create_dir_all(&nested).unwrap();
        create_test_image(&nested.join("n01443537_0.png"), 8, 8);
        create_test_image(&nested.join("n01443537_1.png"), 8, 8);
        fs::write(
            temp_dir.path().join("n01443537").join("n01443537_boxes.txt"),
            "0 0 8 8",
        )
        .unwrap();

        let folder = ImageFolder::new(temp_dir.path(), to_tensor_only()).unwrap();
        assert_eq!(folder.len(), 2);
        assert_eq!(folder.class_distribution(), vec![2]);
    }

    #[test]
    fn test_missing_root() {
        let result = ImageFolder::new("/nonexistent/food-101/train", to_tensor_only());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_root_without_classes() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("loose.png"), 4, 4);

        let result = ImageFolder::new(temp_dir.path(), to_tensor_only());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_empty_class_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_image_folder(temp_dir.path(), &["sushi"], 1, (4, 4));
        fs::create_dir_all(temp_dir.path().join("tacos")).unwrap();

        let err = ImageFolder::new(temp_dir.path(), to_tensor_only()).unwrap_err();
        assert!(err.to_string().contains("tacos"));
    }

    #[test]
    fn test_get_applies_transform() {
        let temp_dir = TempDir::new().unwrap();
        create_image_folder(temp_dir.path(), &["a", "b"], 2, (12, 10));

        let transform = Compose::new(vec![
            Transform::Resize(6),
            Transform::CenterCrop(6),
            Transform::ToTensor,
        ])
        .unwrap();
        let folder = ImageFolder::new(temp_dir.path(), transform).unwrap();

        let item = folder.get(3).unwrap();
        assert_eq!(item.shape, [3, 6, 6]);
        assert_eq!(item.label, 1);
        assert!(folder.get(4).is_none());
    }

    #[test]
    fn test_corrupt_image_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        create_image_folder(temp_dir.path(), &["a"], 1, (4, 4));
        fs::write(temp_dir.path().join("a").join("broken.jpg"), b"not an image").unwrap();

        let folder = ImageFolder::new(temp_dir.path(), to_tensor_only()).unwrap();
        assert_eq!(folder.len(), 2);

        let broken = folder
            .samples()
            .iter()
            .position(|s| s.path.ends_with("broken.jpg"))
            .unwrap();
        let item = folder.get(broken).unwrap();
        assert!(item.is_failed());
        assert!(item.source.ends_with("broken.jpg"));
        assert!(matches!(folder.try_get(broken), Err(Error::Image(_))));
    }

    #[test]
    fn test_corrupt_image_does_not_end_the_epoch() {
        use crate::bundle::DataSource;
        use burn::backend::NdArray;
        use lab_core::LoaderConfig;

        let temp_dir = TempDir::new().unwrap();
        create_image_folder(temp_dir.path(), &["a", "b"], 2, (4, 4));
        fs::write(temp_dir.path().join("a").join("0broken.jpg"), b"not an image").unwrap();

        let folder = ImageFolder::new(temp_dir.path(), to_tensor_only()).unwrap();
        assert_eq!(folder.len(), 5);

        let device = Default::default();
        for workers in [0, 1] {
            let config = LoaderConfig::new(1, workers).with_shuffle(true);
            let source =
                DataSource::<NdArray<f32>>::new(folder.clone(), config, 3, &device).unwrap();
            let total: usize = source.iter().map(|batch| batch.targets.dims()[0]).sum();
            assert_eq!(total, 4);
        }
    }
}
