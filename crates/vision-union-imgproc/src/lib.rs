#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
/// color to grayscale conversion module.
pub mod color;

/// elementwise combine stage module.
pub mod combine;

/// kernels, convolutions and convolution sequences module.
pub mod filter;

/// image padding module.
pub mod padding;

/// module containing parallization utilities.
pub mod parallel;

/// scheduled convolution pipeline module.
pub mod pipeline;

/// task dependency layer module.
pub mod scheduling;
