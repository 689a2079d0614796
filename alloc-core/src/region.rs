//! The one-shot backing region acquired from the host allocator.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// A single contiguous byte range obtained once from the host allocator and
/// released in bulk on drop.
pub(crate) struct BackingRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// Safety: the region is only ever accessed through the segment locks that
// carve it up; the raw pointer itself grants no aliasing on its own.
unsafe impl Send for BackingRegion {}
unsafe impl Sync for BackingRegion {}

impl BackingRegion {
    /// Requests `size` bytes from the host allocator, 16-byte aligned so a
    /// [`crate::header::BlockHeader`] can always be placed at the start.
    ///
    /// Returns `None` if the host allocator refuses the request.
    pub(crate) fn acquire(size: usize) -> Option<Self> {
        let layout = Layout::from_size_align(size, 16).ok()?;
        let ptr = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(ptr)?;
        Some(Self { ptr, layout })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for BackingRegion {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
