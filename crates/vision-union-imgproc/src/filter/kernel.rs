use vision_union_image::ImageSize;

use super::ConvolutionError;

/// Layout of a kernel built from a 1D coefficient vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// A single row: `height == 1`, `width == len`.
    Horizontal,
    /// A single column: `width == 1`, `height == len`.
    Vertical,
}

/// A 2D coefficient matrix stored flat in row-major order.
///
/// Invariant: `data.len() == width * height` and both dimensions are non zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Kernel {
    /// Create a kernel from explicit dimensions and flat row-major coefficients.
    ///
    /// # Errors
    ///
    /// Returns [`ConvolutionError::KernelShape`] if `width * height` differs from
    /// `data.len()` or if a dimension is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use vision_union_imgproc::filter::Kernel;
    ///
    /// let kernel = Kernel::new(3, 1, vec![-1.0, 0.0, 1.0]).unwrap();
    /// assert_eq!(kernel.width(), 3);
    /// assert!(Kernel::new(2, 2, vec![1.0; 3]).is_err());
    /// ```
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self, ConvolutionError> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(ConvolutionError::KernelShape(width, height, data.len()));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a kernel from a genuine 2D source, one slice per row.
    ///
    /// The resulting kernel satisfies `get(x, y) == rows[y][x]`.
    ///
    /// # Errors
    ///
    /// Fails if the source is empty or its rows have different lengths.
    pub fn from_matrix<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, ConvolutionError> {
        let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut data = Vec::with_capacity(width * rows.len());
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != width {
                return Err(ConvolutionError::RaggedKernel(y, row.len(), width));
            }
            data.extend_from_slice(row);
        }
        Self::new(width, rows.len(), data)
    }

    /// Create a kernel from a fixed-size 2D array.
    pub fn from_array<const W: usize, const H: usize>(
        rows: [[f32; W]; H],
    ) -> Result<Self, ConvolutionError> {
        Self::new(W, H, rows.iter().flatten().copied().collect())
    }

    /// Create a degenerate 2D kernel from a 1D source.
    ///
    /// The coefficients are copied verbatim into a `1 x N` ([`Orientation::Horizontal`])
    /// or `N x 1` ([`Orientation::Vertical`]) kernel.
    ///
    /// # Example
    ///
    /// ```
    /// use vision_union_imgproc::filter::{Kernel, Orientation};
    ///
    /// let kernel = Kernel::from_vector(&[1.0, 2.0, 1.0], Orientation::Vertical).unwrap();
    /// assert_eq!(kernel.width(), 1);
    /// assert_eq!(kernel.height(), 3);
    /// ```
    pub fn from_vector(values: &[f32], orientation: Orientation) -> Result<Self, ConvolutionError> {
        let (width, height) = match orientation {
            Orientation::Horizontal => (values.len(), 1),
            Orientation::Vertical => (1, values.len()),
        };
        Self::new(width, height, values.to_vec())
    }

    /// Width of the kernel in coefficients.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the kernel in coefficients.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Kernel dimensions as an [`ImageSize`].
    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width,
            height: self.height,
        }
    }

    /// The flat row-major coefficients.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Coefficient at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    /// Sum of all coefficients.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::kernels;

    fn assert_flat_matches(rows: &[[f32; 3]; 3], kernel: &Kernel) {
        assert_eq!(kernel.as_slice().len(), 9);
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                assert_eq!(kernel.as_slice()[y * kernel.width() + x], v);
                assert_eq!(kernel.get(x, y), Some(v));
            }
        }
    }

    #[test]
    fn from_matrix_row_major() -> Result<(), ConvolutionError> {
        for rows in [kernels::SOBEL_X, kernels::SOBEL_Y] {
            let kernel = Kernel::from_matrix(&rows)?;
            assert_eq!(kernel.width(), 3);
            assert_eq!(kernel.height(), 3);
            assert_flat_matches(&rows, &kernel);
        }
        Ok(())
    }

    #[test]
    fn from_matrix_non_square() -> Result<(), ConvolutionError> {
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        let kernel = Kernel::from_matrix(&rows)?;
        assert_eq!(kernel.width(), 4);
        assert_eq!(kernel.height(), 2);
        assert_eq!(kernel.get(3, 1), Some(8.0));
        assert_eq!(kernel.get(4, 0), None);
        Ok(())
    }

    #[test]
    fn from_matrix_ragged() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert_eq!(
            Kernel::from_matrix(&rows),
            Err(ConvolutionError::RaggedKernel(1, 1, 2))
        );
    }

    #[test]
    fn from_matrix_empty() {
        let rows: Vec<Vec<f32>> = vec![];
        assert!(matches!(
            Kernel::from_matrix(&rows),
            Err(ConvolutionError::KernelShape(0, 0, 0))
        ));
    }

    #[test]
    fn from_vector_horizontal() -> Result<(), ConvolutionError> {
        let kernel = Kernel::from_vector(&kernels::SOBEL_SMOOTH, Orientation::Horizontal)?;
        assert_eq!(kernel.height(), 1);
        assert_eq!(kernel.width(), 3);
        assert_eq!(kernel.as_slice(), &kernels::SOBEL_SMOOTH);
        Ok(())
    }

    #[test]
    fn from_vector_vertical() -> Result<(), ConvolutionError> {
        let kernel = Kernel::from_vector(&kernels::SOBEL_DERIVATIVE, Orientation::Vertical)?;
        assert_eq!(kernel.width(), 1);
        assert_eq!(kernel.height(), 3);
        assert_eq!(kernel.as_slice(), &kernels::SOBEL_DERIVATIVE);
        Ok(())
    }

    #[test]
    fn explicit_shape_mismatch() {
        assert_eq!(
            Kernel::new(3, 2, vec![0.0; 5]),
            Err(ConvolutionError::KernelShape(3, 2, 5))
        );
    }
}
