//! Intrusive block header shared by every slice of a segment.

use core::mem::size_of;
use core::ptr;

/// Metadata prefixing every block in a segment, free or allocated.
///
/// `prev`/`next` link the block into its segment's free list while
/// `free == true`; while `free == false` the links are stale leftovers from
/// whenever the block was last carved out and must not be dereferenced.
///
/// # Safety
/// Every read or write of a `BlockHeader` must happen while the owning
/// segment's lock is held.
#[repr(C)]
pub(crate) struct BlockHeader {
    /// Payload bytes following this header (excludes the header itself).
    pub(crate) size: usize,
    pub(crate) free: bool,
    pub(crate) segment_id: usize,
    pub(crate) prev: *mut BlockHeader,
    pub(crate) next: *mut BlockHeader,
}

pub(crate) const HEADER_SIZE: usize = size_of::<BlockHeader>();

impl BlockHeader {
    /// Writes a fresh, unlinked free header at `addr`.
    ///
    /// # Safety
    /// `addr` must be valid for a `BlockHeader` write and suitably aligned.
    pub(crate) unsafe fn write_free(addr: *mut BlockHeader, size: usize, segment_id: usize) {
        unsafe {
            ptr::write(
                addr,
                BlockHeader {
                    size,
                    free: true,
                    segment_id,
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                },
            );
        }
    }

    /// The payload pointer handed out to callers for this header.
    ///
    /// # Safety
    /// `header` must point at a live `BlockHeader`.
    pub(crate) unsafe fn payload(header: *mut BlockHeader) -> *mut u8 {
        unsafe { (header as *mut u8).add(HEADER_SIZE) }
    }

    /// Recovers the header pointer from a payload pointer previously
    /// returned by [`BlockHeader::payload`].
    ///
    /// # Safety
    /// `payload` must have been produced by a prior call to
    /// [`BlockHeader::payload`] on a still-live header.
    pub(crate) unsafe fn from_payload(payload: *mut u8) -> *mut BlockHeader {
        unsafe { payload.sub(HEADER_SIZE).cast::<BlockHeader>() }
    }

    /// Address immediately following this block's payload, i.e. where the
    /// next header in address order would begin.
    ///
    /// # Safety
    /// `header` must point at a live `BlockHeader`.
    pub(crate) unsafe fn end_addr(header: *mut BlockHeader) -> *mut BlockHeader {
        unsafe { (header as *mut u8).add(HEADER_SIZE + (*header).size).cast() }
    }
}
