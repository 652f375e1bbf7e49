//! Elementwise fan-in of same-sized images.

use thiserror::Error;
use vision_union_image::{Image, ImageAllocator, ImageSize};

use crate::parallel;

/// Number of output elements processed per parallel work item.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Errors raised while combining images.
#[derive(Error, Debug, PartialEq)]
pub enum CombineError {
    /// The inputs and the destination do not share one size.
    #[error("Images must have the same size, got {0}, {1} and destination {2}")]
    SizeMismatch(ImageSize, ImageSize, ImageSize),

    /// A chunk size of zero was requested.
    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// A pure binary operation applied to matching elements of two images.
pub trait Combine: Send + Sync {
    /// Combine one element of each input into one output element.
    fn combine(&self, a: f32, b: f32) -> f32;
}

impl<F> Combine for F
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    fn combine(&self, a: f32, b: f32) -> f32 {
        self(a, b)
    }
}

/// Euclidean magnitude `sqrt(a^2 + b^2)`, the gradient magnitude of two derivatives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Magnitude;

impl Combine for Magnitude {
    fn combine(&self, a: f32, b: f32) -> f32 {
        (a * a + b * b).sqrt()
    }
}

/// Elementwise sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Combine for Sum {
    fn combine(&self, a: f32, b: f32) -> f32 {
        a + b
    }
}

/// Elementwise maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Combine for Max {
    fn combine(&self, a: f32, b: f32) -> f32 {
        a.max(b)
    }
}

/// Combine two images elementwise into `dst`.
///
/// `dst[i] = op(a[i], b[i])` for every index. The index range is split into
/// chunks of `chunk_size` elements that are processed in parallel.
///
/// # Errors
///
/// Returns [`CombineError::SizeMismatch`] if the three images differ in size and
/// [`CombineError::InvalidChunkSize`] if `chunk_size` is zero.
///
/// # Example
///
/// ```
/// use vision_union_image::{CpuAllocator, Image, ImageSize};
/// use vision_union_imgproc::combine::{combine, Magnitude, DEFAULT_CHUNK_SIZE};
///
/// let size = ImageSize { width: 2, height: 1 };
/// let a = Image::<f32, 1, _>::new(size, vec![3.0, 0.0], CpuAllocator).unwrap();
/// let b = Image::<f32, 1, _>::new(size, vec![4.0, 0.0], CpuAllocator).unwrap();
/// let mut dst = Image::<f32, 1, _>::from_size_val(size, 0.0, CpuAllocator).unwrap();
///
/// combine(&a, &b, &mut dst, &Magnitude, DEFAULT_CHUNK_SIZE).unwrap();
/// assert_eq!(dst.as_slice(), &[5.0, 0.0]);
/// ```
pub fn combine<A1, A2, A3, F>(
    a: &Image<f32, 1, A1>,
    b: &Image<f32, 1, A2>,
    dst: &mut Image<f32, 1, A3>,
    op: &F,
    chunk_size: usize,
) -> Result<(), CombineError>
where
    A1: ImageAllocator,
    A2: ImageAllocator,
    A3: ImageAllocator,
    F: Combine + ?Sized,
{
    if a.size() != b.size() || a.size() != dst.size() {
        return Err(CombineError::SizeMismatch(a.size(), b.size(), dst.size()));
    }
    if chunk_size == 0 {
        return Err(CombineError::InvalidChunkSize);
    }

    parallel::par_iter_chunks_val_two(
        a.as_slice(),
        b.as_slice(),
        dst.as_slice_mut(),
        chunk_size,
        |x, y, d| *d = op.combine(*x, *y),
    );

    Ok(())
}

/// Fold `b` into the accumulator `acc` elementwise: `acc[i] = op(acc[i], b[i])`.
///
/// Used to reduce more than two inputs pairwise.
pub fn combine_in_place<A1, A2, F>(
    acc: &mut Image<f32, 1, A1>,
    b: &Image<f32, 1, A2>,
    op: &F,
    chunk_size: usize,
) -> Result<(), CombineError>
where
    A1: ImageAllocator,
    A2: ImageAllocator,
    F: Combine + ?Sized,
{
    if acc.size() != b.size() {
        return Err(CombineError::SizeMismatch(acc.size(), b.size(), acc.size()));
    }
    if chunk_size == 0 {
        return Err(CombineError::InvalidChunkSize);
    }

    parallel::par_iter_chunks_inplace(acc.as_slice_mut(), b.as_slice(), chunk_size, |d, y| {
        *d = op.combine(*d, *y)
    });

    Ok(())
}
