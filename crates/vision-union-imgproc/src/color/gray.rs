use crate::parallel;
use vision_union_image::{Image, ImageAllocator, ImageError};

/// Per-channel weights of a grayscale conversion.
///
/// The weights are passed to [`gray_from_rgb`] explicitly; there is no
/// process-wide default that conversions read behind the caller's back.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LuminanceWeights {
    /// Weight of the red channel.
    pub r: f32,
    /// Weight of the green channel.
    pub g: f32,
    /// Weight of the blue channel.
    pub b: f32,
}

impl LuminanceWeights {
    /// ITU-R BT.709 luma coefficients.
    pub const REC709: LuminanceWeights = LuminanceWeights {
        r: 0.2126,
        g: 0.7152,
        b: 0.0722,
    };

    /// ITU-R BT.601 luma coefficients.
    pub const REC601: LuminanceWeights = LuminanceWeights {
        r: 0.299,
        g: 0.587,
        b: 0.114,
    };

    /// Create custom weights.
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl Default for LuminanceWeights {
    fn default() -> Self {
        Self::REC709
    }
}

/// Convert an RGB image to grayscale using the formula:
///
/// Y = w.r * R + w.g * G + w.b * B
///
/// # Arguments
///
/// * `src` - The input RGB image.
/// * `dst` - The output grayscale image.
/// * `weights` - The channel weights.
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use vision_union_image::{CpuAllocator, Image, ImageSize};
/// use vision_union_imgproc::color::{gray_from_rgb, LuminanceWeights};
///
/// let image = Image::<f32, 3, _>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
///     CpuAllocator,
/// )
/// .unwrap();
///
/// let mut gray = Image::<f32, 1, _>::from_size_val(image.size(), 0.0, CpuAllocator).unwrap();
///
/// gray_from_rgb(&image, &mut gray, &LuminanceWeights::default()).unwrap();
/// assert_eq!(gray.num_channels(), 1);
/// assert_eq!(gray.size().width, 4);
/// assert_eq!(gray.size().height, 5);
/// ```
pub fn gray_from_rgb<A1: ImageAllocator, A2: ImageAllocator>(
    src: &Image<f32, 3, A1>,
    dst: &mut Image<f32, 1, A2>,
    weights: &LuminanceWeights,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let LuminanceWeights { r: rw, g: gw, b: bw } = *weights;

    // parallelize the grayscale conversion by rows
    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        dst_pixel[0] = rw * src_pixel[0] + gw * src_pixel[1] + bw * src_pixel[2];
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vision_union_image::{CpuAllocator, ImageSize};

    #[test]
    fn gray_from_rgb_rec709() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        #[rustfmt::skip]
        let rgb = Image::<f32, 3, _>::new(size, vec![
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
            1.0, 1.0, 1.0,
        ], CpuAllocator)?;
        let mut gray = Image::<f32, 1, _>::from_size_val(size, 0.0, CpuAllocator)?;

        gray_from_rgb(&rgb, &mut gray, &LuminanceWeights::default())?;

        let expected = [0.2126, 0.7152, 0.0722, 1.0];
        for (g, e) in gray.as_slice().iter().zip(expected.iter()) {
            assert_relative_eq!(*g, *e, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn gray_from_rgb_custom_weights() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize {
            width: 1,
            height: 2,
        };
        let rgb = Image::<f32, 3, _>::new(size, vec![10.0, 20.0, 30.0, 0.5, 0.5, 0.5], CpuAllocator)?;
        let mut gray = Image::<f32, 1, _>::from_size_val(size, 0.0, CpuAllocator)?;

        gray_from_rgb(&rgb, &mut gray, &LuminanceWeights::new(0.0, 0.0, 1.0))?;
        assert_eq!(gray.as_slice(), &[30.0, 0.5]);

        gray_from_rgb(&rgb, &mut gray, &LuminanceWeights::REC601)?;
        assert_relative_eq!(gray.as_slice()[0], 18.15, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn gray_from_rgb_size_mismatch() -> Result<(), ImageError> {
        let rgb = Image::<f32, 3, _>::from_size_val([3, 2].into(), 0.0, CpuAllocator)?;
        let mut gray = Image::<f32, 1, _>::from_size_val([2, 3].into(), 0.0, CpuAllocator)?;
        assert_eq!(
            gray_from_rgb(&rgb, &mut gray, &LuminanceWeights::REC709),
            Err(ImageError::InvalidImageSize(3, 2, 2, 3))
        );
        Ok(())
    }
}
