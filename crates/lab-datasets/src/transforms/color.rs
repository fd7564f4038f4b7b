//! Photometric augmentation.
//!
//! Adjustments work on 8-bit pixels and round back to `u8`, so repeated
//! jitter accumulates quantization error the same way PIL-based pipelines do.

use image::{DynamicImage, GrayImage, RgbImage};
use lab_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;

/// Luma weights (ITU-R 601-2)
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Randomly changes brightness, contrast, saturation and hue.
///
/// Each non-zero component samples a factor per call, and the components
/// are applied in a random order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorJitter {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Adjustment {
    Brightness(f32),
    Contrast(f32),
    Saturation(f32),
    Hue(f32),
}

impl ColorJitter {
    pub fn new(brightness: f32, contrast: f32, saturation: f32) -> Self {
        Self {
            brightness,
            contrast,
            saturation,
            hue: 0.0,
        }
    }

    pub fn with_hue(mut self, hue: f32) -> Self {
        self.hue = hue;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidArgument(format!(
                    "ColorJitter {name} must be non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=0.5).contains(&self.hue) {
            return Err(Error::InvalidArgument(format!(
                "ColorJitter hue must be in [0, 0.5], got {}",
                self.hue
            )));
        }
        Ok(())
    }

    fn sample_adjustments<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Adjustment> {
        let mut adjustments = Vec::with_capacity(4);

        if self.brightness > 0.0 {
            adjustments.push(Adjustment::Brightness(sample_factor(self.brightness, rng)));
        }
        if self.contrast > 0.0 {
            adjustments.push(Adjustment::Contrast(sample_factor(self.contrast, rng)));
        }
        if self.saturation > 0.0 {
            adjustments.push(Adjustment::Saturation(sample_factor(self.saturation, rng)));
        }
        if self.hue > 0.0 {
            adjustments.push(Adjustment::Hue(rng.gen_range(-self.hue..=self.hue)));
        }

        adjustments.shuffle(rng);
        adjustments
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: DynamicImage, rng: &mut R) -> DynamicImage {
        let adjustments = self.sample_adjustments(rng);
        if adjustments.is_empty() {
            return image;
        }

        match image {
            // Saturation and hue have nothing to act on in a single channel
            DynamicImage::ImageLuma8(mut gray) => {
                for adjustment in adjustments {
                    gray = match adjustment {
                        Adjustment::Brightness(f) => adjust_brightness_gray(&gray, f),
                        Adjustment::Contrast(f) => adjust_contrast_gray(&gray, f),
                        Adjustment::Saturation(_) | Adjustment::Hue(_) => gray,
                    };
                }
                DynamicImage::ImageLuma8(gray)
            }
            other => {
                let mut rgb = other.to_rgb8();
                for adjustment in adjustments {
                    rgb = match adjustment {
                        Adjustment::Brightness(f) => adjust_brightness(&rgb, f),
                        Adjustment::Contrast(f) => adjust_contrast(&rgb, f),
                        Adjustment::Saturation(f) => adjust_saturation(&rgb, f),
                        Adjustment::Hue(f) => adjust_hue(&rgb, f),
                    };
                }
                DynamicImage::ImageRgb8(rgb)
            }
        }
    }
}

fn sample_factor<R: Rng + ?Sized>(strength: f32, rng: &mut R) -> f32 {
    rng.gen_range((1.0 - strength).max(0.0)..=(1.0 + strength))
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn luma(pixel: &[u8]) -> f32 {
    LUMA[0] * pixel[0] as f32 + LUMA[1] * pixel[1] as f32 + LUMA[2] * pixel[2] as f32
}

/// Blends with black
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = to_u8(pixel[c] as f32 * factor);
        }
    }
    out
}

/// Blends with the mean grayscale value of the whole image
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let count = (image.width() * image.height()).max(1) as f32;
    let mean = (image.pixels().map(|p| luma(&p.0)).sum::<f32>() / count).round();

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            pixel[c] = to_u8(mean + factor * (pixel[c] as f32 - mean));
        }
    }
    out
}

/// Blends each pixel with its own grayscale value
pub fn adjust_saturation(image: &RgbImage, factor: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let gray = luma(&pixel.0).round();
        for c in 0..3 {
            pixel[c] = to_u8(gray + factor * (pixel[c] as f32 - gray));
        }
    }
    out
}

/// Rotates the HSV hue by `shift` turns, `shift` in `[-0.5, 0.5]`
pub fn adjust_hue(image: &RgbImage, shift: f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let h = (h + shift).rem_euclid(1.0);
        let (r, g, b) = hsv_to_rgb(h, s, v);
        pixel.0 = [r, g, b];
    }
    out
}

fn adjust_brightness_gray(image: &GrayImage, factor: f32) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = to_u8(pixel[0] as f32 * factor);
    }
    out
}

fn adjust_contrast_gray(image: &GrayImage, factor: f32) -> GrayImage {
    let count = (image.width() * image.height()).max(1) as f32;
    let mean = (image.pixels().map(|p| p[0] as f32).sum::<f32>() / count).round();

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = to_u8(mean + factor * (pixel[0] as f32 - mean));
    }
    out
}

/// Hue, saturation and value in `[0, 1]`
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector as i32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    (to_u8(r * 255.0), to_u8(g * 255.0), to_u8(b * 255.0))
}
