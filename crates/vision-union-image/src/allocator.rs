use crate::error::ImageError;

/// A trait for allocating and releasing the backing store of images.
///
/// Images never allocate on their own: every buffer comes from an allocator and
/// is handed back to it when the image is released.
///
/// # Methods
///
/// * `alloc` - Reserves a buffer of `len` elements filled with `val`.
/// * `alloc_copy` - Reserves a buffer holding a copy of `src`.
/// * `dealloc` - Releases a buffer previously returned by `alloc`.
pub trait ImageAllocator: Clone + Send + Sync + 'static {
    /// Allocates a buffer of `len` elements, each initialised to `val`.
    fn alloc<T: Clone>(&self, len: usize, val: T) -> Result<Vec<T>, ImageError>;

    /// Allocates a buffer holding a copy of `src`.
    fn alloc_copy<T: Clone>(&self, src: &[T]) -> Result<Vec<T>, ImageError>;

    /// Releases a buffer owned by an image.
    fn dealloc<T>(&self, data: Vec<T>);
}

/// An image allocator that uses the system allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuAllocator;

impl ImageAllocator for CpuAllocator {
    /// Allocates memory for an image buffer.
    ///
    /// # Returns
    ///
    /// The filled buffer, or [`ImageError::AllocationFailed`] if the system
    /// allocator could not reserve it.
    fn alloc<T: Clone>(&self, len: usize, val: T) -> Result<Vec<T>, ImageError> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| ImageError::AllocationFailed(len))?;
        data.resize(len, val);
        Ok(data)
    }

    fn alloc_copy<T: Clone>(&self, src: &[T]) -> Result<Vec<T>, ImageError> {
        let mut data = Vec::new();
        data.try_reserve_exact(src.len())
            .map_err(|_| ImageError::AllocationFailed(src.len()))?;
        data.extend_from_slice(src);
        Ok(data)
    }

    fn dealloc<T>(&self, data: Vec<T>) {
        drop(data);
    }
}
