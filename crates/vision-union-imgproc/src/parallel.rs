use rayon::prelude::*;

use vision_union_image::{Image, ImageAllocator};

/// Apply a function to each pixel in the image in parallel.
///
/// The work is split by rows; `f` receives the `C1` channels of a source pixel and
/// the `C2` channels of the matching destination pixel.
pub fn par_iter_rows<
    T1,
    const C1: usize,
    A1: ImageAllocator,
    T2,
    const C2: usize,
    A2: ImageAllocator,
>(
    src: &Image<T1, C1, A1>,
    dst: &mut Image<T2, C2, A2>,
    f: impl Fn(&[T1], &mut [T2]) + Send + Sync,
) where
    T1: Clone + Send + Sync,
    T2: Clone + Send + Sync,
{
    if src.cols() == 0 {
        return;
    }

    src.as_slice()
        .par_chunks_exact(C1 * src.cols())
        .zip(dst.as_slice_mut().par_chunks_exact_mut(C2 * src.cols()))
        .for_each(|(src_chunk, dst_chunk)| {
            src_chunk
                .chunks_exact(C1)
                .zip(dst_chunk.chunks_exact_mut(C2))
                .for_each(|(src_pixel, dst_pixel)| {
                    f(src_pixel, dst_pixel);
                });
        });
}

/// Apply a function elementwise over two sources and a destination, in parallel
/// chunks of `chunk_size` elements.
///
/// PRECONDITION: the three slices have the same length and `chunk_size > 0`.
pub fn par_iter_chunks_val_two<T1, T2, T3>(
    src1: &[T1],
    src2: &[T2],
    dst: &mut [T3],
    chunk_size: usize,
    f: impl Fn(&T1, &T2, &mut T3) + Send + Sync,
) where
    T1: Sync,
    T2: Sync,
    T3: Send,
{
    src1.par_chunks(chunk_size)
        .zip(src2.par_chunks(chunk_size))
        .zip(dst.par_chunks_mut(chunk_size))
        .for_each(|((src1_chunk, src2_chunk), dst_chunk)| {
            src1_chunk
                .iter()
                .zip(src2_chunk.iter())
                .zip(dst_chunk.iter_mut())
                .for_each(|((src1_val, src2_val), dst_val)| {
                    f(src1_val, src2_val, dst_val);
                });
        });
}

/// Update a destination elementwise from a source, in parallel chunks of
/// `chunk_size` elements.
///
/// PRECONDITION: both slices have the same length and `chunk_size > 0`.
pub fn par_iter_chunks_inplace<T1, T2>(
    dst: &mut [T1],
    src: &[T2],
    chunk_size: usize,
    f: impl Fn(&mut T1, &T2) + Send + Sync,
) where
    T1: Send,
    T2: Sync,
{
    dst.par_chunks_mut(chunk_size)
        .zip(src.par_chunks(chunk_size))
        .for_each(|(dst_chunk, src_chunk)| {
            dst_chunk
                .iter_mut()
                .zip(src_chunk.iter())
                .for_each(|(dst_val, src_val)| f(dst_val, src_val));
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_union_image::{CpuAllocator, ImageError, ImageSize};

    #[test]
    fn test_par_iter_rows() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let src = Image::<f32, 2, _>::new(size, vec![1., 2., 3., 4., 5., 6., 7., 8.], CpuAllocator)?;
        let mut dst = Image::<f32, 1, _>::from_size_val(size, 0.0, CpuAllocator)?;

        par_iter_rows(&src, &mut dst, |s, d| d[0] = s[0] + s[1]);
        assert_eq!(dst.as_slice(), &[3., 7., 11., 15.]);

        Ok(())
    }

    #[test]
    fn test_par_iter_chunks_val_two() {
        let a = vec![1, 2, 3, 4, 5];
        let b = vec![10, 20, 30, 40, 50];
        let mut dst = vec![0; 5];
        par_iter_chunks_val_two(&a, &b, &mut dst, 2, |x, y, d| *d = x + y);
        assert_eq!(dst, vec![11, 22, 33, 44, 55]);
    }

    #[test]
    fn test_par_iter_chunks_inplace() {
        let mut dst = vec![1, 2, 3];
        let src = vec![3, 2, 1];
        par_iter_chunks_inplace(&mut dst, &src, 1, |d, s| *d *= s);
        assert_eq!(dst, vec![3, 4, 3]);
    }
}
