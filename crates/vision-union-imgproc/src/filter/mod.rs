//! Filter operations
//!
//! Kernels, strided convolutions and the sequences that chain them.

/// Fixed kernels
pub mod kernels;

mod convolution;
pub use convolution::{Convolution, Stride};

mod error;
pub use error::ConvolutionError;

mod kernel;
pub use kernel::{Kernel, Orientation};

mod sequence;
pub use sequence::{ConvolutionSequence, ParallelConvolutionSequences};
