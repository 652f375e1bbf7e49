/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the image size is not valid.
    #[error("Invalid image size ({0}x{1}), expected ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when the allocator could not reserve the image buffer.
    #[error("Failed to allocate {0} elements for the image buffer")]
    AllocationFailed(usize),
}
