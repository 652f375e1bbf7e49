use crate::allocator::{CpuAllocator, ImageAllocator};
use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use vision_union_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by the size.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// Represents an image with pixel data.
///
/// The pixels are stored in a contiguous row-major buffer of `width * height * CHANNELS`
/// elements with no header and no row alignment. The buffer is obtained from the
/// allocator `A` and handed back to it when the image is released or dropped.
/// Clones take their buffer from the same allocator.
#[derive(Debug)]
pub struct Image<T, const CHANNELS: usize, A: ImageAllocator = CpuAllocator> {
    size: ImageSize,
    data: Vec<T>,
    alloc: A,
}

impl<T, const CHANNELS: usize, A: ImageAllocator> Image<T, CHANNELS, A> {
    /// Create a new image from pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `data` - The pixel data of the image.
    /// * `alloc` - The allocator that will release the buffer.
    ///
    /// # Errors
    ///
    /// If the length of the pixel data does not match the image size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use vision_union_image::{CpuAllocator, Image, ImageSize};
    ///
    /// let image = Image::<f32, 1, _>::new(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     vec![0f32; 10 * 20],
    ///     CpuAllocator,
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// assert_eq!(image.num_channels(), 1);
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>, alloc: A) -> Result<Self, ImageError> {
        // check if the data length matches the image size
        if data.len() != size.width * size.height * CHANNELS {
            return Err(ImageError::InvalidChannelShape(
                data.len(),
                size.width * size.height * CHANNELS,
            ));
        }

        Ok(Self { size, data, alloc })
    }

    /// Create a new image with the given size and default pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `val` - The value every element is initialised to.
    /// * `alloc` - The allocator providing the buffer.
    ///
    /// # Errors
    ///
    /// If the allocator cannot reserve the buffer, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use vision_union_image::{CpuAllocator, Image, ImageSize};
    ///
    /// let image = Image::<f32, 1, _>::from_size_val(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     0.0,
    ///     CpuAllocator,
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(image.as_slice().len(), 200);
    /// ```
    pub fn from_size_val(size: ImageSize, val: T, alloc: A) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        let data = alloc.alloc(size.width * size.height * CHANNELS, val)?;
        Image::new(size, data, alloc)
    }

    /// Copy the image into a new buffer from the same allocator.
    ///
    /// # Errors
    ///
    /// If the allocator cannot reserve the buffer, an error is returned.
    pub fn try_clone(&self) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        let data = self.alloc.alloc_copy(&self.data)?;
        Image::new(self.size, data, self.alloc.clone())
    }

    /// Release the image, handing its buffer back to the allocator.
    ///
    /// Dropping an image releases it too; this call makes the end of the
    /// buffer's lifetime explicit at the call site.
    pub fn release(self) {
        drop(self);
    }

    /// Get the size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the number of columns of the image.
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// Get the number of rows of the image.
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// Get the width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the number of channels in the image.
    pub fn num_channels(&self) -> usize {
        CHANNELS
    }

    /// Get the allocator backing the image.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Get the pixel data as a flat row-major slice.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Get the pixel data as a mutable flat row-major slice.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Get the element at `[row, col, channel]`, or `None` if out of bounds.
    pub fn get(&self, index: [usize; 3]) -> Option<&T> {
        let [y, x, c] = index;
        if y >= self.size.height || x >= self.size.width || c >= CHANNELS {
            return None;
        }
        self.data.get((y * self.size.width + x) * CHANNELS + c)
    }

    /// Get a mutable reference to the element at `[row, col, channel]`.
    pub fn get_mut(&mut self, index: [usize; 3]) -> Option<&mut T> {
        let [y, x, c] = index;
        if y >= self.size.height || x >= self.size.width || c >= CHANNELS {
            return None;
        }
        self.data.get_mut((y * self.size.width + x) * CHANNELS + c)
    }

    /// Set every element of the image to `val`.
    pub fn fill(&mut self, val: T)
    where
        T: Clone,
    {
        self.data.fill(val);
    }
}

impl<T: Clone, const CHANNELS: usize, A: ImageAllocator> Clone for Image<T, CHANNELS, A> {
    /// # Panics
    ///
    /// Panics if the allocator cannot reserve the buffer, as `Vec::clone` does
    /// when the system allocator fails. Use [`Image::try_clone`] to handle it.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(image) => image,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T, const CHANNELS: usize, A: ImageAllocator> Drop for Image<T, CHANNELS, A> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.alloc.dealloc(data);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::allocator::{CpuAllocator, ImageAllocator};
    use crate::image::{Image, ImageError, ImageSize};

    #[test]
    fn image_size() {
        let image_size = ImageSize {
            width: 10,
            height: 20,
        };
        assert_eq!(image_size.width, 10);
        assert_eq!(image_size.height, 20);
        assert_eq!(image_size.area(), 200);
        assert_eq!(ImageSize::from([10, 20]), image_size);
    }

    #[test]
    fn image_smoke() -> Result<(), ImageError> {
        let image = Image::<f32, 1, _>::new(
            ImageSize {
                width: 10,
                height: 20,
            },
            vec![0f32; 10 * 20],
            CpuAllocator,
        )?;
        assert_eq!(image.size().width, 10);
        assert_eq!(image.size().height, 20);
        assert_eq!(image.num_channels(), 1);
        assert_eq!(image.as_slice().len(), 200);

        Ok(())
    }

    #[test]
    fn image_invalid_length() {
        let res = Image::<f32, 1, _>::new(
            ImageSize {
                width: 3,
                height: 3,
            },
            vec![0f32; 8],
            CpuAllocator,
        );
        assert!(matches!(res, Err(ImageError::InvalidChannelShape(8, 9))));
    }

    #[test]
    fn image_get_row_major() -> Result<(), ImageError> {
        let mut image = Image::<f32, 1, _>::new(
            ImageSize {
                width: 3,
                height: 2,
            },
            vec![0., 1., 2., 3., 4., 5.],
            CpuAllocator,
        )?;
        assert_eq!(image.get([1, 0, 0]), Some(&3.0));
        assert_eq!(image.get([0, 2, 0]), Some(&2.0));
        assert_eq!(image.get([2, 0, 0]), None);
        assert_eq!(image.get([0, 3, 0]), None);

        if let Some(v) = image.get_mut([1, 2, 0]) {
            *v = 9.0;
        }
        assert_eq!(image.as_slice()[5], 9.0);

        Ok(())
    }

    #[derive(Clone, Default)]
    struct CountingAllocator {
        allocs: Arc<AtomicUsize>,
        deallocs: Arc<AtomicUsize>,
    }

    impl ImageAllocator for CountingAllocator {
        fn alloc<T: Clone>(&self, len: usize, val: T) -> Result<Vec<T>, ImageError> {
            self.allocs.fetch_add(1, Ordering::SeqCst);
            CpuAllocator.alloc(len, val)
        }

        fn alloc_copy<T: Clone>(&self, src: &[T]) -> Result<Vec<T>, ImageError> {
            self.allocs.fetch_add(1, Ordering::SeqCst);
            CpuAllocator.alloc_copy(src)
        }

        fn dealloc<T>(&self, data: Vec<T>) {
            self.deallocs.fetch_add(1, Ordering::SeqCst);
            drop(data);
        }
    }

    #[test]
    fn image_clone_goes_through_allocator() -> Result<(), ImageError> {
        let alloc = CountingAllocator::default();
        let image = Image::<f32, 1, _>::from_size_val([3, 2].into(), 2.5, alloc.clone())?;
        let copy = image.clone();
        let other = copy.try_clone()?;
        assert_eq!(copy.as_slice(), image.as_slice());
        assert_eq!(other.as_slice(), image.as_slice());
        assert_eq!(alloc.allocs.load(Ordering::SeqCst), 3);

        drop(image);
        copy.release();
        drop(other);
        assert_eq!(alloc.deallocs.load(Ordering::SeqCst), 3);

        Ok(())
    }

    #[test]
    fn image_from_size_val_and_release() -> Result<(), ImageError> {
        let mut image = Image::<f32, 1, _>::from_size_val([4, 2].into(), 1.5, CpuAllocator)?;
        assert!(image.as_slice().iter().all(|&v| v == 1.5));
        image.fill(0.0);
        assert!(image.as_slice().iter().all(|&v| v == 0.0));
        image.release();

        Ok(())
    }
}
