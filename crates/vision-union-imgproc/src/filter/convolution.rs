use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use vision_union_image::{Image, ImageAllocator, ImageSize};

use super::{ConvolutionError, Kernel};

/// Step between successive output positions, per axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stride {
    /// Horizontal step in pixels.
    pub x: usize,
    /// Vertical step in pixels.
    pub y: usize,
}

impl Stride {
    /// A stride of one pixel on both axes.
    pub const UNIT: Stride = Stride { x: 1, y: 1 };

    /// Create a new stride.
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl Default for Stride {
    fn default() -> Self {
        Self::UNIT
    }
}

/// A kernel together with the stride it is slid with.
#[derive(Clone, Debug, PartialEq)]
pub struct Convolution {
    kernel: Kernel,
    stride: Stride,
}

impl Convolution {
    /// Create a new convolution.
    ///
    /// # Errors
    ///
    /// Returns [`ConvolutionError::InvalidStride`] if a stride component is zero.
    pub fn new(kernel: Kernel, stride: Stride) -> Result<Self, ConvolutionError> {
        if stride.x == 0 || stride.y == 0 {
            return Err(ConvolutionError::InvalidStride(stride.x, stride.y));
        }
        Ok(Self { kernel, stride })
    }

    /// Create a convolution with a unit stride.
    pub fn unit(kernel: Kernel) -> Self {
        Self {
            kernel,
            stride: Stride::UNIT,
        }
    }

    /// The kernel of the convolution.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// The stride of the convolution.
    pub fn stride(&self) -> Stride {
        self.stride
    }

    /// Compute the size of the image produced from an input of size `input`.
    ///
    /// `out_h = ceil((H - Kh + 1) / Sy)` and `out_w = ceil((W - Kw + 1) / Sx)`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvolutionError::KernelLargerThanInput`] if the kernel does not fit.
    ///
    /// # Example
    ///
    /// ```
    /// use vision_union_image::ImageSize;
    /// use vision_union_imgproc::filter::{kernels, Convolution, Stride};
    ///
    /// let conv = Convolution::new(kernels::sobel_x().unwrap(), Stride::new(2, 2)).unwrap();
    /// let out = conv.output_size(ImageSize { width: 7, height: 7 }).unwrap();
    /// assert_eq!(out, ImageSize { width: 3, height: 3 });
    /// ```
    pub fn output_size(&self, input: ImageSize) -> Result<ImageSize, ConvolutionError> {
        let (kw, kh) = (self.kernel.width(), self.kernel.height());
        if input.width < kw || input.height < kh {
            return Err(ConvolutionError::KernelLargerThanInput(kw, kh, input));
        }
        Ok(ImageSize {
            width: (input.width - kw + 1).div_ceil(self.stride.x),
            height: (input.height - kh + 1).div_ceil(self.stride.y),
        })
    }

    /// Convolve `src` into `dst`.
    ///
    /// A strided cross-correlation without kernel flip: for every output pixel
    /// `(oy / Sy, ox / Sx)` the sum of `src[oy + ky][ox + kx] * kernel[ky][kx]` over the
    /// kernel is accumulated in `f32`. Output rows are computed in parallel.
    ///
    /// The input must already be padded as the caller's pad mode requires; no
    /// implicit clipping or border handling happens here.
    ///
    /// # Errors
    ///
    /// Returns [`ConvolutionError::OutputSizeMismatch`] if `dst` does not have the
    /// size given by [`Convolution::output_size`].
    pub fn convolve<A1: ImageAllocator, A2: ImageAllocator>(
        &self,
        src: &Image<f32, 1, A1>,
        dst: &mut Image<f32, 1, A2>,
    ) -> Result<(), ConvolutionError> {
        let expected = self.output_size(src.size())?;
        if dst.size() != expected {
            return Err(ConvolutionError::OutputSizeMismatch(dst.size(), expected));
        }
        if expected.area() == 0 {
            return Ok(());
        }

        let src_cols = src.cols();
        let src_data = src.as_slice();
        let kernel = self.kernel.as_slice();
        let (kw, kh) = (self.kernel.width(), self.kernel.height());
        let Stride { x: sx, y: sy } = self.stride;

        dst.as_slice_mut()
            .par_chunks_exact_mut(expected.width)
            .enumerate()
            .for_each(|(r, dst_row)| {
                let oy = r * sy;
                for (c, dst_pixel) in dst_row.iter_mut().enumerate() {
                    let ox = c * sx;
                    let mut acc = 0.0f32;
                    for (ky, kernel_row) in kernel.chunks_exact(kw).enumerate().take(kh) {
                        let start = (oy + ky) * src_cols + ox;
                        let src_row = &src_data[start..start + kw];
                        acc += src_row
                            .iter()
                            .zip(kernel_row.iter())
                            .map(|(s, k)| s * k)
                            .sum::<f32>();
                    }
                    *dst_pixel = acc;
                }
            });

        Ok(())
    }

    /// Convolve `src` into a newly allocated image of the derived output size.
    pub fn apply<A: ImageAllocator>(
        &self,
        src: &Image<f32, 1, A>,
    ) -> Result<Image<f32, 1, A>, ConvolutionError> {
        let size = self.output_size(src.size())?;
        let mut dst = Image::from_size_val(size, 0.0, src.allocator().clone())?;
        self.convolve(src, &mut dst)?;
        Ok(dst)
    }
}
