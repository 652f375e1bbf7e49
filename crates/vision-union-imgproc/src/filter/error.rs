use vision_union_image::{ImageError, ImageSize};

/// Errors raised while building or running convolutions.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConvolutionError {
    /// The kernel dimensions do not match the number of coefficients.
    #[error("kernel of {0}x{1} cannot hold {2} coefficients")]
    KernelShape(usize, usize, usize),

    /// The rows of a 2D kernel source have different lengths.
    #[error("kernel row {0} has {1} coefficients, expected {2}")]
    RaggedKernel(usize, usize, usize),

    /// A stride component is zero.
    #[error("stride must be >= 1 on both axes, got ({0}, {1})")]
    InvalidStride(usize, usize),

    /// The kernel does not fit inside the input on some axis.
    #[error("kernel of {0}x{1} does not fit an input of {2}")]
    KernelLargerThanInput(usize, usize, ImageSize),

    /// The output image does not have the size the convolution produces.
    #[error("output size {0} does not match the expected {1}")]
    OutputSizeMismatch(ImageSize, ImageSize),

    /// A sequence was built without any convolution.
    #[error("a convolution sequence needs at least one convolution")]
    EmptySequence,

    /// A parallel set was built without any sequence.
    #[error("parallel convolution sequences need at least one sequence")]
    NoSequences,

    /// The sequence has not produced any image yet.
    #[error("the convolution sequence has not been run")]
    NoOutput,

    /// The sequence images were released.
    #[error("the convolution sequence images were released")]
    Released,

    /// Error from the image crate.
    #[error(transparent)]
    Image(#[from] ImageError),
}
