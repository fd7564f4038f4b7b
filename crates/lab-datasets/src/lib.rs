//! Dataset construction for image-classification experiments.
//!
//! Each factory builds the train and test pipelines of one dataset and
//! returns a [`DataBundle`] of Burn data loaders plus metadata:
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use lab_core::BundleOptions;
//! use lab_datasets::food101;
//!
//! let device = Default::default();
//! let bundle = food101::<NdArray<f32>>(&BundleOptions::default(), &device)?;
//! for batch in bundle.train_dataset().iter() {
//!     println!("{:?}", batch.images.dims());
//! }
//! # Ok::<(), lab_core::Error>(())
//! ```

pub mod bundle;
pub mod burn_dataset;
pub mod download;
pub mod factories;
pub mod folder;
pub mod mnist;
pub mod transforms;

pub use bundle::{DataBundle, DataSource};
pub use burn_dataset::{ImageBatch, ImageBatcher, ImageItem};
pub use factories::{
    build_bundle, food101, imagenet, mnist, pipelines_for, tiny_imagenet, tiny_resized_food101,
};
pub use folder::ImageFolder;
pub use mnist::Mnist;
pub use transforms::{ColorJitter, Compose, ImageTensor, Lighting, Transform};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bundle::{DataBundle, DataSource};
    pub use crate::burn_dataset::{ImageBatch, ImageBatcher, ImageItem};
    pub use crate::factories::*;
    pub use crate::folder::ImageFolder;
    pub use crate::mnist::Mnist;
    pub use crate::transforms::*;
}
