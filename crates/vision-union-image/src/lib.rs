#![deny(missing_docs)]
//! Image types and allocators for single-channel convolution pipelines

/// allocators providing the backing store of images.
pub mod allocator;

/// image representation for computer vision purposes.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::allocator::{CpuAllocator, ImageAllocator};
pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
