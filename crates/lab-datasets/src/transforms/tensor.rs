//! CHW float tensors produced by `ToTensor` and consumed by the tensor-stage
//! transforms.

use image::{DynamicImage, GenericImageView};
use lab_core::{Error, Result};

/// A single image as planar `f32` data in `[channels, height, width]` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    channels: usize,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// Wraps planar data, checking it matches the given shape
    pub fn new(data: Vec<f32>, channels: usize, height: usize, width: usize) -> Result<Self> {
        let expected = channels * height * width;
        if data.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "Expected {} values for shape [{}, {}, {}], got {}",
                expected,
                channels,
                height,
                width,
                data.len()
            )));
        }

        Ok(Self {
            data,
            channels,
            height,
            width,
        })
    }

    /// Converts an image to `[0, 1]` floats.
    ///
    /// Grayscale images keep a single channel. Everything else is converted
    /// to three RGB channels.
    pub fn from_image(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);
        let plane = width * height;

        match image {
            DynamicImage::ImageLuma8(gray) => {
                let data = gray.pixels().map(|p| p[0] as f32 / 255.0).collect();
                Self {
                    data,
                    channels: 1,
                    height,
                    width,
                }
            }
            _ => {
                let rgb = image.to_rgb8();
                let mut data = vec![0.0f32; 3 * plane];

                for (i, pixel) in rgb.pixels().enumerate() {
                    data[i] = pixel[0] as f32 / 255.0;
                    data[plane + i] = pixel[1] as f32 / 255.0;
                    data[2 * plane + i] = pixel[2] as f32 / 255.0;
                }

                Self {
                    data,
                    channels: 3,
                    height,
                    width,
                }
            }
        }
    }

    /// Shape as `[channels, height, width]`
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Values of one channel plane
    pub fn channel(&self, channel: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[channel * plane..(channel + 1) * plane]
    }

    /// Adds a constant to every value of each channel
    pub fn add_per_channel(mut self, offsets: &[f32]) -> Result<Self> {
        self.check_channels(offsets.len(), "add_per_channel")?;

        let plane = self.height * self.width;
        for (c, offset) in offsets.iter().enumerate() {
            for value in &mut self.data[c * plane..(c + 1) * plane] {
                *value += offset;
            }
        }

        Ok(self)
    }

    /// Applies `(x - mean[c]) / std[c]` to every channel
    pub fn normalize(mut self, mean: &[f32], std: &[f32]) -> Result<Self> {
        if mean.len() != std.len() {
            return Err(Error::InvalidArgument(format!(
                "Normalize got {} means and {} standard deviations",
                mean.len(),
                std.len()
            )));
        }
        self.check_channels(mean.len(), "Normalize")?;

        let plane = self.height * self.width;
        for c in 0..self.channels {
            for value in &mut self.data[c * plane..(c + 1) * plane] {
                *value = (*value - mean[c]) / std[c];
            }
        }

        Ok(self)
    }

    /// Repeats a single channel three times. Three-channel tensors pass through.
    pub fn gray_to_rgb(self) -> Result<Self> {
        match self.channels {
            3 => Ok(self),
            1 => {
                let mut data = Vec::with_capacity(self.data.len() * 3);
                for _ in 0..3 {
                    data.extend_from_slice(&self.data);
                }
                Ok(Self {
                    data,
                    channels: 3,
                    height: self.height,
                    width: self.width,
                })
            }
            n => Err(Error::Transform(format!(
                "GrayToRgb expects 1 or 3 channels, got {n}"
            ))),
        }
    }

    fn check_channels(&self, expected: usize, op: &str) -> Result<()> {
        if self.channels != expected {
            return Err(Error::Transform(format!(
                "{} expects {} channels, tensor has {}",
                op, expected, self.channels
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma, Rgb};

    #[test]
    fn test_new_checks_length() {
        assert!(ImageTensor::new(vec![0.0; 12], 3, 2, 2).is_ok());
        assert!(ImageTensor::new(vec![0.0; 11], 3, 2, 2).is_err());
    }

    #[test]
    fn test_from_rgb_image_is_planar() {
        let img = ImageBuffer::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([255u8, 0, 0])
            } else {
                Rgb([0u8, 0, 255])
            }
        });
        let tensor = ImageTensor::from_image(&DynamicImage::ImageRgb8(img));

        assert_eq!(tensor.shape(), [3, 1, 2]);
        assert_eq!(tensor.channel(0), &[1.0, 0.0]);
        assert_eq!(tensor.channel(1), &[0.0, 0.0]);
        assert_eq!(tensor.channel(2), &[0.0, 1.0]);
    }

    #[test]
    fn test_from_gray_image_keeps_one_channel() {
        let img: GrayImage = ImageBuffer::from_pixel(4, 3, Luma([51u8]));
        let tensor = ImageTensor::from_image(&DynamicImage::ImageLuma8(img));

        assert_eq!(tensor.shape(), [1, 3, 4]);
        assert!(tensor.data().iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_gray_to_rgb() {
        let tensor = ImageTensor::new(vec![0.1, 0.2, 0.3, 0.4], 1, 2, 2).unwrap();
        let rgb = tensor.gray_to_rgb().unwrap();

        assert_eq!(rgb.shape(), [3, 2, 2]);
        for c in 0..3 {
            assert_eq!(rgb.channel(c), &[0.1, 0.2, 0.3, 0.4]);
        }

        let two = ImageTensor::new(vec![0.0; 8], 2, 2, 2).unwrap();
        assert!(two.gray_to_rgb().is_err());
    }

    #[test]
    fn test_normalize_maps_mean_and_std() {
        let mean = [0.5, 0.25, 0.75];
        let std = [0.5, 0.25, 0.25];
        let data = vec![0.5, 1.0, 0.25, 0.5, 0.75, 1.0];
        let tensor = ImageTensor::new(data, 3, 1, 2).unwrap();

        let normalized = tensor.normalize(&mean, &std).unwrap();
        assert_eq!(normalized.channel(0), &[0.0, 1.0]);
        assert_eq!(normalized.channel(1), &[0.0, 1.0]);
        assert_eq!(normalized.channel(2), &[0.0, 1.0]);
    }

    #[test]
    fn test_normalize_channel_mismatch() {
        let tensor = ImageTensor::new(vec![0.0; 4], 1, 2, 2).unwrap();
        let result = tensor.normalize(&[0.5, 0.5, 0.5], &[0.2, 0.2, 0.2]);
        assert!(matches!(result, Err(Error::Transform(_))));
    }
}
