use super::{ConvolutionError, Kernel, Orientation};

/// Sobel derivative along x (responds to vertical edges).
pub const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];

/// Sobel derivative along y (responds to horizontal edges).
pub const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Derivative factor of the separable Sobel kernels.
pub const SOBEL_DERIVATIVE: [f32; 3] = [-1.0, 0.0, 1.0];

/// Smoothing factor of the separable Sobel kernels.
pub const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Create the 3x3 Sobel kernel along x.
pub fn sobel_x() -> Result<Kernel, ConvolutionError> {
    Kernel::from_array(SOBEL_X)
}

/// Create the 3x3 Sobel kernel along y.
pub fn sobel_y() -> Result<Kernel, ConvolutionError> {
    Kernel::from_array(SOBEL_Y)
}

/// Create the two 1D factors of the Sobel kernel along x.
///
/// # Returns
///
/// A horizontal derivative kernel and a vertical smoothing kernel. Applying them
/// one after the other is equivalent to [`sobel_x`].
pub fn sobel_x_separable() -> Result<(Kernel, Kernel), ConvolutionError> {
    Ok((
        Kernel::from_vector(&SOBEL_DERIVATIVE, Orientation::Horizontal)?,
        Kernel::from_vector(&SOBEL_SMOOTH, Orientation::Vertical)?,
    ))
}

/// Create the two 1D factors of the Sobel kernel along y.
///
/// # Returns
///
/// A horizontal smoothing kernel and a vertical derivative kernel.
pub fn sobel_y_separable() -> Result<(Kernel, Kernel), ConvolutionError> {
    Ok((
        Kernel::from_vector(&SOBEL_SMOOTH, Orientation::Horizontal)?,
        Kernel::from_vector(&SOBEL_DERIVATIVE, Orientation::Vertical)?,
    ))
}

/// Create a normalized box kernel.
///
/// # Arguments
///
/// * `width` - The width of the kernel.
/// * `height` - The height of the kernel.
pub fn box_kernel(width: usize, height: usize) -> Result<Kernel, ConvolutionError> {
    let n = width * height;
    Kernel::new(width, height, vec![1.0 / n as f32; n])
}

/// Create a 1x1 kernel with a single unit coefficient.
pub fn identity() -> Result<Kernel, ConvolutionError> {
    Kernel::new(1, 1, vec![1.0])
}

/// Create a normalized 1D gaussian kernel.
///
/// # Arguments
///
/// * `kernel_size` - The number of coefficients.
/// * `sigma` - The sigma of the gaussian.
/// * `orientation` - Whether the kernel is a row or a column.
pub fn gaussian_kernel_1d(
    kernel_size: usize,
    sigma: f32,
    orientation: Orientation,
) -> Result<Kernel, ConvolutionError> {
    let mean = kernel_size.saturating_sub(1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    let mut kernel = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - mean;
            (-(x * x) / (2.0 * sigma_sq)).exp()
        })
        .collect::<Vec<_>>();

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);

    Kernel::from_vector(&kernel, orientation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sobel_kernels() -> Result<(), ConvolutionError> {
        let kx = sobel_x()?;
        assert_eq!(kx.as_slice(), &[-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0]);
        assert_eq!(kx.sum(), 0.0);

        let ky = sobel_y()?;
        assert_eq!(ky.get(1, 0), Some(-2.0));
        assert_eq!(ky.get(1, 2), Some(2.0));
        Ok(())
    }

    #[test]
    fn test_sobel_separable_factors() -> Result<(), ConvolutionError> {
        let (dx, smooth) = sobel_x_separable()?;
        assert_eq!((dx.width(), dx.height()), (3, 1));
        assert_eq!((smooth.width(), smooth.height()), (1, 3));

        // the outer product of the factors gives back the 2D kernel
        let kx = sobel_x()?;
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(
                    kx.get(x, y),
                    Some(SOBEL_SMOOTH[y] * SOBEL_DERIVATIVE[x])
                );
            }
        }
        Ok(())
    }

    #[test]
    fn test_box_kernel() -> Result<(), ConvolutionError> {
        let kernel = box_kernel(3, 3)?;
        assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-6);
        assert!(box_kernel(0, 3).is_err());
        Ok(())
    }

    #[test]
    fn test_gaussian_kernel_1d() -> Result<(), ConvolutionError> {
        let kernel = gaussian_kernel_1d(5, 0.5, Orientation::Horizontal)?;

        let expected = [
            0.00026386508,
            0.10645077,
            0.78657067,
            0.10645077,
            0.00026386508,
        ];

        for (k, e) in kernel.as_slice().iter().zip(expected.iter()) {
            assert_relative_eq!(*k, *e, epsilon = 1e-6);
        }
        Ok(())
    }
}
