//! Resizing, cropping and flipping.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use lab_core::{Error, Result};
use rand::Rng;

/// Target dimensions when the shorter edge is scaled to `size`
pub fn shorter_edge_dimensions(width: u32, height: u32, size: u32) -> (u32, u32) {
    let (short, long) = if width <= height {
        (width, height)
    } else {
        (height, width)
    };
    let new_long = (size as u64 * long as u64 / short.max(1) as u64) as u32;

    if width <= height {
        (size, new_long)
    } else {
        (new_long, size)
    }
}

/// Resizes so the shorter edge equals `size`, keeping the aspect ratio
pub fn resize(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = shorter_edge_dimensions(width, height, size);

    if (new_w, new_h) == (width, height) {
        return image.clone();
    }

    image.resize_exact(new_w, new_h, FilterType::Triangle)
}

/// Places the image on a zero canvas with the given borders
pub fn pad(image: &DynamicImage, left: u32, top: u32, right: u32, bottom: u32) -> DynamicImage {
    if left == 0 && top == 0 && right == 0 && bottom == 0 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let mut canvas = DynamicImage::new(
        width + left + right,
        height + top + bottom,
        image.color(),
    );
    image::imageops::replace(&mut canvas, image, left as i64, top as i64);

    canvas
}

/// Zero-pads every border by `padding`, then cuts a random `size x size`
/// window
pub fn random_crop<R: Rng + ?Sized>(
    image: &DynamicImage,
    size: u32,
    padding: u32,
    rng: &mut R,
) -> Result<DynamicImage> {
    let padded = pad(image, padding, padding, padding, padding);
    let (width, height) = padded.dimensions();

    if width < size || height < size {
        return Err(Error::Transform(format!(
            "Required crop size {}x{} is larger than padded image {}x{}",
            size, size, width, height
        )));
    }

    if width == size && height == size {
        return Ok(padded);
    }

    let x = rng.gen_range(0..=(width - size));
    let y = rng.gen_range(0..=(height - size));

    Ok(padded.crop_imm(x, y, size, size))
}

/// Cuts the centered `size x size` window, zero-padding smaller images first
pub fn center_crop(image: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();

    let image = if width < size || height < size {
        let pad_w = size.saturating_sub(width);
        let pad_h = size.saturating_sub(height);
        pad(
            image,
            pad_w / 2,
            pad_h / 2,
            (pad_w + 1) / 2,
            (pad_h + 1) / 2,
        )
    } else {
        image.clone()
    };

    let (width, height) = image.dimensions();
    if width == size && height == size {
        return image;
    }

    let left = ((width - size) as f64 / 2.0).round_ties_even() as u32;
    let top = ((height - size) as f64 / 2.0).round_ties_even() as u32;

    image.crop_imm(left, top, size, size)
}

/// Mirrors the image left to right with probability `p`
pub fn random_horizontal_flip<R: Rng + ?Sized>(
    image: DynamicImage,
    p: f64,
    rng: &mut R,
) -> DynamicImage {
    if rng.gen_bool(p) {
        image.fliph()
    } else {
        image
    }
}
