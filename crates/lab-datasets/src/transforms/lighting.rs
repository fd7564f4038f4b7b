//! AlexNet-style PCA lighting noise.

use lab_core::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::ImageTensor;

/// ImageNet RGB eigenvalues
pub const IMAGENET_EIGVAL: [f32; 3] = [0.2175, 0.0188, 0.0045];

/// ImageNet RGB eigenvectors, one per column
pub const IMAGENET_EIGVEC: [[f32; 3]; 3] = [
    [-0.5675, 0.7192, 0.4009],
    [-0.5808, -0.0045, -0.8140],
    [-0.5836, -0.6948, 0.4203],
];

/// Adds a random per-channel offset drawn along the principal components of
/// the RGB pixel distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Lighting {
    pub alphastd: f32,
    pub eigval: [f32; 3],
    pub eigvec: [[f32; 3]; 3],
}

impl Lighting {
    pub fn new(alphastd: f32, eigval: [f32; 3], eigvec: [[f32; 3]; 3]) -> Self {
        Self {
            alphastd,
            eigval,
            eigvec,
        }
    }

    /// Lighting noise with the ImageNet PCA basis
    pub fn imagenet(alphastd: f32) -> Self {
        Self::new(alphastd, IMAGENET_EIGVAL, IMAGENET_EIGVEC)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.alphastd.is_finite() || self.alphastd < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "Lighting alphastd must be finite and non-negative, got {}",
                self.alphastd
            )));
        }
        Ok(())
    }

    /// Per-channel offset for the given coefficients:
    /// `rgb[i] = sum_j eigvec[i][j] * alpha[j] * eigval[j]`
    pub fn offsets(&self, alpha: [f32; 3]) -> [f32; 3] {
        let mut rgb = [0.0f32; 3];
        for (i, row) in self.eigvec.iter().enumerate() {
            rgb[i] = row
                .iter()
                .zip(alpha.iter().zip(self.eigval.iter()))
                .map(|(v, (a, e))| v * a * e)
                .sum();
        }
        rgb
    }

    pub fn apply<R: Rng + ?Sized>(&self, tensor: ImageTensor, rng: &mut R) -> Result<ImageTensor> {
        if self.alphastd == 0.0 {
            return Ok(tensor);
        }
        if tensor.channels() != 3 {
            return Err(Error::Transform(format!(
                "Lighting expects 3 channels, tensor has {}",
                tensor.channels()
            )));
        }

        let normal = Normal::new(0.0f32, self.alphastd)
            .map_err(|e| Error::InvalidArgument(format!("Lighting alphastd: {e}")))?;
        let alpha = [
            normal.sample(rng),
            normal.sample(rng),
            normal.sample(rng),
        ];

        tensor.add_per_channel(&self.offsets(alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn gradient_tensor() -> ImageTensor {
        let data = (0..3 * 4 * 4).map(|i| i as f32 / 48.0).collect();
        ImageTensor::new(data, 3, 4, 4).unwrap()
    }

    #[test]
    fn test_zero_alphastd_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let tensor = gradient_tensor();
        let out = Lighting::imagenet(0.0).apply(tensor.clone(), &mut rng).unwrap();
        assert_eq!(out, tensor);
    }

    #[test]
    fn test_offsets_follow_eigen_basis() {
        let lighting = Lighting::imagenet(0.1);
        let rgb = lighting.offsets([1.0, 0.0, 0.0]);

        for i in 0..3 {
            let expected = IMAGENET_EIGVEC[i][0] * IMAGENET_EIGVAL[0];
            assert!((rgb[i] - expected).abs() < 1e-6);
        }

        assert_eq!(lighting.offsets([0.0; 3]), [0.0; 3]);
    }

    #[test]
    fn test_adds_constant_per_channel() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let tensor = gradient_tensor();
        let out = Lighting::imagenet(0.1).apply(tensor.clone(), &mut rng).unwrap();

        assert_eq!(out.shape(), tensor.shape());
        for c in 0..3 {
            let deltas: Vec<f32> = out
                .channel(c)
                .iter()
                .zip(tensor.channel(c))
                .map(|(a, b)| a - b)
                .collect();
            assert!(deltas.iter().all(|d| (d - deltas[0]).abs() < 1e-5));
        }
    }

    #[test]
    fn test_rejects_single_channel() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tensor = ImageTensor::new(vec![0.5; 4], 1, 2, 2).unwrap();
        assert!(Lighting::imagenet(0.1).apply(tensor, &mut rng).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Lighting::imagenet(0.1).validate().is_ok());
        assert!(Lighting::imagenet(-0.1).validate().is_err());
        assert!(Lighting::imagenet(f32::NAN).validate().is_err());
    }
}
