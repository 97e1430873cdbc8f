#![deny(missing_docs)]
//! Image types for depth maps and other dense 2D data

/// image representation for depth and intensity data.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{DepthImage, Image, ImageSize};
