use rayon::prelude::*;
use thiserror::Error;
use vision_union_image::{Image, ImageAllocator, ImageError, ImageSize};

use crate::filter::{Convolution, ParallelConvolutionSequences};

/// Errors raised while padding images.
#[derive(Error, Debug, PartialEq)]
pub enum PaddingError {
    /// The destination does not have the padded size.
    #[error("Invalid padded image size ({0}x{1}), expected ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// The requested mode is not one of the supported ones.
    #[error("unsupported padding mode: {0}")]
    UnsupportedMode(String),

    /// Error from the image crate.
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// A border type for the spatial padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PadMode {
    /// This border type fills the border with a single, constant value.
    ///
    /// Example: ...d c b a | 0 0 0 0...
    #[default]
    Constant,
}

impl PadMode {
    /// Pad `src` into `dst` according to the mode.
    ///
    /// PRECONDITION: `dst` has the size of `src` grown by `padding`.
    pub fn apply<T, const C: usize, A1: ImageAllocator, A2: ImageAllocator>(
        &self,
        src: &Image<T, C, A1>,
        dst: &mut Image<T, C, A2>,
        padding: &Padding,
        value: T,
    ) -> Result<(), PaddingError>
    where
        T: Copy + Send + Sync,
    {
        match self {
            PadMode::Constant => constant_into(src, dst, padding, value),
        }
    }
}

impl std::str::FromStr for PadMode {
    type Err = PaddingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" => Ok(PadMode::Constant),
            _ => Err(PaddingError::UnsupportedMode(s.to_string())),
        }
    }
}

/// How the input of a convolution is padded relative to its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvolutionPadMode {
    /// Pad so that a unit-stride convolution keeps the input size.
    #[default]
    Same,
    /// No padding: the output shrinks by the kernel size minus one.
    Valid,
}

impl ConvolutionPadMode {
    /// The padding this mode requires for `convolution` on an input of size `input`.
    pub fn padding(&self, input: ImageSize, convolution: &Convolution) -> Padding {
        match self {
            ConvolutionPadMode::Same => same_padding(input, convolution),
            ConvolutionPadMode::Valid => Padding::ZERO,
        }
    }
}

impl std::str::FromStr for ConvolutionPadMode {
    type Err = PaddingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "same" => Ok(ConvolutionPadMode::Same),
            "valid" => Ok(ConvolutionPadMode::Valid),
            _ => Err(PaddingError::UnsupportedMode(s.to_string())),
        }
    }
}

/// Represents 2D padding with top, bottom, left, and right values (in pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Padding {
    /// Amount of padding to add on the top side.
    pub top: usize,
    /// Amount of padding to add on the bottom side.
    pub bottom: usize,
    /// Amount of padding to add on the left side.
    pub left: usize,
    /// Amount of padding to add on the right side.
    pub right: usize,
}

impl Padding {
    /// No padding on any side.
    pub const ZERO: Padding = Padding {
        top: 0,
        bottom: 0,
        left: 0,
        right: 0,
    };

    /// Create a padding from its four margins.
    pub fn new(top: usize, bottom: usize, left: usize, right: usize) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// The same margin on every side.
    pub fn uniform(size: usize) -> Self {
        Self::new(size, size, size, size)
    }

    /// Validates that a new image size correctly matches the expected dimensions
    /// after applying this padding to an existing image.
    ///
    /// # Example
    /// ```rust
    /// use vision_union_image::ImageSize;
    /// use vision_union_imgproc::padding::Padding;
    ///
    /// let padding = Padding { top: 1, bottom: 1, left: 2, right: 2 };
    /// let old_size = ImageSize { width: 4, height: 4 };
    /// let new_size = ImageSize { width: 8, height: 6 };
    ///
    /// assert!(padding.validate_size(old_size, new_size));
    /// ```
    pub fn validate_size(&self, old_size: ImageSize, new_size: ImageSize) -> bool {
        new_size == padded_size(old_size, self)
    }
}

impl std::fmt::Display for Padding {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "top: {}, bottom: {}, left: {}, right: {}",
            self.top, self.bottom, self.left, self.right
        )
    }
}

/// Split the gap between an axis length and its convolution output length over
/// the two opposing margins; the later margin takes the odd unit.
///
/// The valid output length is signed: a kernel longer than the axis gives a
/// negative length, which widens the gap so the padded axis fits the kernel.
fn split_axis(len: usize, kernel_len: usize, stride: usize) -> (usize, usize) {
    let valid = len as isize - kernel_len as isize + 1;
    let stride = stride as isize;
    // ceiling division; `/` already rounds a negative quotient up
    let out_len = if valid > 0 {
        (valid + stride - 1) / stride
    } else {
        valid / stride
    };
    let diff = (len as isize - out_len).unsigned_abs();
    let half = diff / 2;
    (half, diff - half)
}

/// Compute the padding that gives a "same" sized convolution output.
///
/// For an input of `H x W`, a kernel of `Kh x Kw` and strides `(Sx, Sy)`, the
/// output of a valid convolution would be `outH = ceil((H - Kh + 1) / Sy)` by
/// `outW = ceil((W - Kw + 1) / Sx)`. The height difference `H - outH` goes to the
/// top and bottom margins and the width difference `W - outW` to the left and right
/// margins. When a difference is odd, bottom or right receives the extra unit.
///
/// # Example
///
/// ```
/// use vision_union_image::ImageSize;
/// use vision_union_imgproc::filter::{kernels, Convolution};
/// use vision_union_imgproc::padding::{same_padding, Padding};
///
/// let conv = Convolution::unit(kernels::sobel_x().unwrap());
/// let padding = same_padding(ImageSize { width: 5, height: 5 }, &conv);
/// assert_eq!(padding, Padding::uniform(1));
/// ```
pub fn same_padding(input: ImageSize, convolution: &Convolution) -> Padding {
    let kernel = convolution.kernel();
    let stride = convolution.stride();
    let (top, bottom) = split_axis(input.height, kernel.height(), stride.y);
    let (left, right) = split_axis(input.width, kernel.width(), stride.x);
    Padding {
        top,
        bottom,
        left,
        right,
    }
}

/// Size of an image of size `size` once `padding` is applied.
pub fn padded_size(size: ImageSize, padding: &Padding) -> ImageSize {
    ImageSize {
        width: size.width + padding.left + padding.right,
        height: size.height + padding.top + padding.bottom,
    }
}

/// Number of elements per channel that `padding` adds to an image of size `size`.
pub fn size_difference(size: ImageSize, padding: &Padding) -> usize {
    padded_size(size, padding).area() - size.area()
}

/// Pad `src` with a constant `value` into the caller-owned `dst`.
///
/// `top` rows of `value` are written first, then every source row framed by
/// `left` and `right` cells of `value`, then `bottom` rows of `value`. The source
/// rows are copied verbatim and in order. Rows are written in parallel.
///
/// The caller must be the only accessor of `dst` for the duration of the call,
/// which the exclusive borrow guarantees.
///
/// # Errors
///
/// Returns [`PaddingError::InvalidImageSize`] if `dst` does not have the padded size.
///
/// # Example
///
/// ```rust
/// use vision_union_image::{CpuAllocator, Image, ImageSize};
/// use vision_union_imgproc::padding::{constant_into, Padding};
///
/// let src = Image::<f32, 1, _>::new(
///     ImageSize { width: 2, height: 2 },
///     vec![1.0; 4],
///     CpuAllocator,
/// ).unwrap();
///
/// let mut dst = Image::<f32, 1, _>::from_size_val(
///     ImageSize { width: 4, height: 4 },
///     0.0,
///     CpuAllocator,
/// ).unwrap();
///
/// constant_into(&src, &mut dst, &Padding::uniform(1), 0.0).unwrap();
/// assert_eq!(dst.as_slice()[5], 1.0);
/// ```
pub fn constant_into<T, const C: usize, A1: ImageAllocator, A2: ImageAllocator>(
    src: &Image<T, C, A1>,
    dst: &mut Image<T, C, A2>,
    padding: &Padding,
    value: T,
) -> Result<(), PaddingError>
where
    T: Copy + Send + Sync,
{
    let expected = padded_size(src.size(), padding);
    if dst.size() != expected {
        return Err(PaddingError::InvalidImageSize(
            dst.width(),
            dst.height(),
            expected.width,
            expected.height,
        ));
    }
    if dst.as_slice().is_empty() {
        return Ok(());
    }

    let old_stride = src.width() * C;
    let new_stride = dst.width() * C;
    let left = padding.left * C;
    let top = padding.top;
    let content_rows = top..top + src.height();
    let old_data = src.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(new_stride)
        .enumerate()
        .for_each(|(y, dst_row)| {
            if !content_rows.contains(&y) {
                dst_row.fill(value);
                return;
            }
            let src_start = (y - top) * old_stride;
            let (left_pad, rest) = dst_row.split_at_mut(left);
            let (content, right_pad) = rest.split_at_mut(old_stride);
            left_pad.fill(value);
            content.copy_from_slice(&old_data[src_start..src_start + old_stride]);
            right_pad.fill(value);
        });

    Ok(())
}

/// Pad `src` with a constant `value` into a newly allocated image.
///
/// The output is `(W + left + right) x (H + top + bottom)` and comes from the
/// allocator of `src`.
pub fn constant<T, const C: usize, A: ImageAllocator>(
    src: &Image<T, C, A>,
    padding: &Padding,
    value: T,
) -> Result<Image<T, C, A>, PaddingError>
where
    T: Copy + Send + Sync,
{
    let size = padded_size(src.size(), padding);
    let mut dst = Image::from_size_val(size, value, src.allocator().clone())?;
    constant_into(src, &mut dst, padding, value)?;
    Ok(dst)
}

/// Pad `src` into a newly allocated image with the given mode.
pub fn pad<T, const C: usize, A: ImageAllocator>(
    src: &Image<T, C, A>,
    padding: &Padding,
    mode: PadMode,
    value: T,
) -> Result<Image<T, C, A>, PaddingError>
where
    T: Copy + Send + Sync,
{
    let size = padded_size(src.size(), padding);
    let mut dst = Image::from_size_val(size, value, src.allocator().clone())?;
    mode.apply(src, &mut dst, padding, value)?;
    Ok(dst)
}

/// Pad the input of a single convolution according to `mode`.
pub fn convolution_input<A: ImageAllocator>(
    src: &Image<f32, 1, A>,
    convolution: &Convolution,
    mode: ConvolutionPadMode,
    value: f32,
) -> Result<Image<f32, 1, A>, PaddingError> {
    let padding = mode.padding(src.size(), convolution);
    constant(src, &padding, value)
}

/// Pad the shared input of parallel sequences according to `mode`.
///
/// The padding is derived from the first convolution of the first sequence.
pub fn parallel_convolution_input<A: ImageAllocator>(
    src: &Image<f32, 1, A>,
    sequences: &ParallelConvolutionSequences,
    mode: ConvolutionPadMode,
    value: f32,
) -> Result<Image<f32, 1, A>, PaddingError> {
    convolution_input(src, sequences.first_convolution(), mode, value)
}
