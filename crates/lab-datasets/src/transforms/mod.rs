//! Per-sample image transforms and the `Compose` pipeline.
//!
//! A pipeline starts on a decoded image, switches to a CHW float tensor at
//! `ToTensor`, and finishes on the tensor:
//!
//! ```text
//! Resize -> RandomCrop -> RandomHorizontalFlip -> ToTensor -> Normalize
//! ```

pub mod color;
pub mod geometry;
pub mod lighting;
pub mod tensor;

pub use color::ColorJitter;
pub use lighting::Lighting;
pub use tensor::ImageTensor;

use image::DynamicImage;
use lab_core::{Error, Result};
use rand::Rng;

/// Channel means of CIFAR-10, shared by the smaller datasets
pub const CIFAR_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// Channel standard deviations of CIFAR-10
pub const CIFAR_STD: [f32; 3] = [0.2023, 0.1994, 0.2010];
/// Channel means of ImageNet
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Channel standard deviations of ImageNet
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Which representation a transform works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Image,
    Tensor,
}

/// A sample in flight through a pipeline
#[derive(Debug, Clone)]
pub enum Sample {
    Image(DynamicImage),
    Tensor(ImageTensor),
}

impl Sample {
    pub fn stage(&self) -> Stage {
        match self {
            Sample::Image(_) => Stage::Image,
            Sample::Tensor(_) => Stage::Tensor,
        }
    }
}

/// One preprocessing step
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Scale the shorter edge to the given size
    Resize(u32),
    /// Zero-pad every border, then crop a random square
    RandomCrop { size: u32, padding: u32 },
    /// Crop the centered square
    CenterCrop(u32),
    /// Mirror left to right with the given probability
    RandomHorizontalFlip(f64),
    ColorJitter(ColorJitter),
    /// Convert to `[0, 1]` CHW floats
    ToTensor,
    /// Repeat a single channel into RGB
    GrayToRgb,
    Lighting(Lighting),
    Normalize { mean: Vec<f32>, std: Vec<f32> },
}

impl Transform {
    pub fn random_crop(size: u32, padding: u32) -> Self {
        Transform::RandomCrop { size, padding }
    }

    pub fn horizontal_flip() -> Self {
        Transform::RandomHorizontalFlip(0.5)
    }

    pub fn normalize(mean: [f32; 3], std: [f32; 3]) -> Self {
        Transform::Normalize {
            mean: mean.to_vec(),
            std: std.to_vec(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Resize(_) => "Resize",
            Transform::RandomCrop { .. } => "RandomCrop",
            Transform::CenterCrop(_) => "CenterCrop",
            Transform::RandomHorizontalFlip(_) => "RandomHorizontalFlip",
            Transform::ColorJitter(_) => "ColorJitter",
            Transform::ToTensor => "ToTensor",
            Transform::GrayToRgb => "GrayToRgb",
            Transform::Lighting(_) => "Lighting",
            Transform::Normalize { .. } => "Normalize",
        }
    }

    /// Representation the transform expects as input
    pub fn input_stage(&self) -> Stage {
        match self {
            Transform::Resize(_)
            | Transform::RandomCrop { .. }
            | Transform::CenterCrop(_)
            | Transform::RandomHorizontalFlip(_)
            | Transform::ColorJitter(_)
            | Transform::ToTensor => Stage::Image,
            Transform::GrayToRgb | Transform::Lighting(_) | Transform::Normalize { .. } => {
                Stage::Tensor
            }
        }
    }

    /// Representation the transform produces
    pub fn output_stage(&self) -> Stage {
        match self {
            Transform::ToTensor => Stage::Tensor,
            other => other.input_stage(),
        }
    }

    /// Checks the parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Transform::Resize(size) | Transform::CenterCrop(size) if *size == 0 => Err(
                Error::InvalidArgument(format!("{} size must be positive", self.name())),
            ),
            Transform::RandomCrop { size: 0, .. } => Err(Error::InvalidArgument(
                "RandomCrop size must be positive".to_string(),
            )),
            Transform::RandomHorizontalFlip(p) if !(0.0..=1.0).contains(p) => {
                Err(Error::InvalidArgument(format!(
                    "RandomHorizontalFlip probability must be in [0, 1], got {p}"
                )))
            }
            Transform::ColorJitter(jitter) => jitter.validate(),
            Transform::Lighting(lighting) => lighting.validate(),
            Transform::Normalize { mean, std } => {
                if mean.len() != std.len() || mean.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "Normalize needs matching non-empty mean and std, got {} and {}",
                        mean.len(),
                        std.len()
                    )));
                }
                if std.iter().any(|s| *s == 0.0) {
                    return Err(Error::InvalidArgument(
                        "Normalize std must not contain zeros".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, sample: Sample, rng: &mut R) -> Result<Sample> {
        match (self, sample) {
            (Transform::Resize(size), Sample::Image(img)) => {
                Ok(Sample::Image(geometry::resize(&img, *size)))
            }
            (Transform::RandomCrop { size, padding }, Sample::Image(img)) => Ok(Sample::Image(
                geometry::random_crop(&img, *size, *padding, rng)?,
            )),
            (Transform::CenterCrop(size), Sample::Image(img)) => {
                Ok(Sample::Image(geometry::center_crop(&img, *size)))
            }
            (Transform::RandomHorizontalFlip(p), Sample::Image(img)) => Ok(Sample::Image(
                geometry::random_horizontal_flip(img, *p, rng),
            )),
            (Transform::ColorJitter(jitter), Sample::Image(img)) => {
                Ok(Sample::Image(jitter.apply(img, rng)))
            }
            (Transform::ToTensor, Sample::Image(img)) => {
                Ok(Sample::Tensor(ImageTensor::from_image(&img)))
            }
            (Transform::GrayToRgb, Sample::Tensor(t)) => Ok(Sample::Tensor(t.gray_to_rgb()?)),
            (Transform::Lighting(lighting), Sample::Tensor(t)) => {
                Ok(Sample::Tensor(lighting.apply(t, rng)?))
            }
            (Transform::Normalize { mean, std }, Sample::Tensor(t)) => {
                Ok(Sample::Tensor(t.normalize(mean, std)?))
            }
            (transform, sample) => Err(Error::Transform(format!(
                "{} expects {:?} input, got {:?}",
                transform.name(),
                transform.input_stage(),
                sample.stage()
            ))),
        }
    }
}

/// An ordered transform pipeline from a decoded image to a tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Compose {
    transforms: Vec<Transform>,
}

impl Compose {
    /// Builds a pipeline, rejecting invalid parameters and misordered stages.
    ///
    /// Image transforms must precede the single `ToTensor`, tensor
    /// transforms must follow it.
    pub fn new(transforms: Vec<Transform>) -> Result<Self> {
        let mut stage = Stage::Image;

        for transform in &transforms {
            transform.validate()?;

            if transform.input_stage() != stage {
                return Err(Error::Config(format!(
                    "{} expects {:?} input but the pipeline is at the {:?} stage",
                    transform.name(),
                    transform.input_stage(),
                    stage
                )));
            }
            stage = transform.output_stage();
        }

        if stage != Stage::Tensor {
            return Err(Error::Config(
                "Pipeline must convert the image with ToTensor".to_string(),
            ));
        }

        Ok(Self { transforms })
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Runs every transform in order
    pub fn apply<R: Rng + ?Sized>(&self, image: DynamicImage, rng: &mut R) -> Result<ImageTensor> {
        let mut sample = Sample::Image(image);
        for transform in &self.transforms {
            sample = transform.apply(sample, rng)?;
        }

        match sample {
            Sample::Tensor(tensor) => Ok(tensor),
            Sample::Image(_) => Err(Error::Transform(
                "Pipeline ended on an image".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for Compose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.transforms.iter().map(|t| t.name()).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rgb_image(width: u32, height: u32) -> DynamicImage {
        let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([128u8, 64, 32]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_compose_rejects_missing_to_tensor() {
        let result = Compose::new(vec![Transform::Resize(32), Transform::horizontal_flip()]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_compose_rejects_tensor_op_before_to_tensor() {
        let result = Compose::new(vec![
            Transform::normalize(CIFAR_MEAN, CIFAR_STD),
            Transform::ToTensor,
        ]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_compose_rejects_image_op_after_to_tensor() {
        let result = Compose::new(vec![Transform::ToTensor, Transform::CenterCrop(8)]);
        assert!(matches!(result, Err(Error::Config(_))));

        let twice = Compose::new(vec![Transform::ToTensor, Transform::ToTensor]);
        assert!(twice.is_err());
    }

    #[test]
    fn test_compose_rejects_bad_parameters() {
        assert!(Compose::new(vec![Transform::Resize(0), Transform::ToTensor]).is_err());
        assert!(Compose::new(vec![
            Transform::RandomHorizontalFlip(1.5),
            Transform::ToTensor
        ])
        .is_err());
        assert!(Compose::new(vec![
            Transform::ToTensor,
            Transform::Normalize {
                mean: vec![0.5],
                std: vec![0.0],
            },
        ])
        .is_err());
    }

    #[test]
    fn test_train_style_pipeline() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let pipeline = Compose::new(vec![
            Transform::Resize(32),
            Transform::random_crop(32, 4),
            Transform::horizontal_flip(),
            Transform::ToTensor,
            Transform::normalize(CIFAR_MEAN, CIFAR_STD),
        ])
        .unwrap();

        let tensor = pipeline.apply(rgb_image(64, 48), &mut rng).unwrap();
        assert_eq!(tensor.shape(), [3, 32, 32]);
        assert_eq!(pipeline.len(), 5);
        assert_eq!(
            pipeline.to_string(),
            "Resize -> RandomCrop -> RandomHorizontalFlip -> ToTensor -> Normalize"
        );
    }

    #[test]
    fn test_grayscale_pipeline_expands_channels() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let pipeline = Compose::new(vec![
            Transform::Resize(28),
            Transform::ToTensor,
            Transform::GrayToRgb,
            Transform::normalize(CIFAR_MEAN, CIFAR_STD),
        ])
        .unwrap();

        let gray: GrayImage = ImageBuffer::from_pixel(28, 28, Luma([255u8]));
        let tensor = pipeline
            .apply(DynamicImage::ImageLuma8(gray), &mut rng)
            .unwrap();

        assert_eq!(tensor.shape(), [3, 28, 28]);
        let expected = (1.0 - CIFAR_MEAN[1]) / CIFAR_STD[1];
        assert!(tensor.channel(1).iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_imagenet_style_pipeline() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let pipeline = Compose::new(vec![
            Transform::Resize(24),
            Transform::CenterCrop(24),
            Transform::horizontal_flip(),
            Transform::ColorJitter(ColorJitter::new(0.4, 0.4, 0.4)),
            Transform::ToTensor,
            Transform::Lighting(Lighting::imagenet(0.1)),
            Transform::normalize(IMAGENET_MEAN, IMAGENET_STD),
        ])
        .unwrap();

        let tensor = pipeline.apply(rgb_image(40, 30), &mut rng).unwrap();
        assert_eq!(tensor.shape(), [3, 24, 24]);
        assert!(tensor.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_stage_mismatch_at_apply() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tensor = ImageTensor::new(vec![0.0; 3], 3, 1, 1).unwrap();
        let result = Transform::Resize(4).apply(Sample::Tensor(tensor), &mut rng);
        assert!(matches!(result, Err(Error::Transform(_))));
    }
}
