//! A single independently-locked sub-range of the backing region.

use crate::header::BlockHeader;
use std::ptr;
use std::sync::{Condvar, Mutex};

/// Mutable state guarded by a segment's lock: just the free-list head,
/// since every header itself lives in the backing region and is mutated
/// in place under the same lock.
pub(crate) struct SegmentState {
    pub(crate) free_list_head: *mut BlockHeader,
}

// Safety: the raw pointer is only ever dereferenced while the owning
// `Segment`'s mutex is held.
unsafe impl Send for SegmentState {}

/// One of the allocator's `N` disjoint sub-ranges, each with its own free
/// list, mutex, and condition variable.
pub(crate) struct Segment {
    pub(crate) id: usize,
    pub(crate) start: *mut u8,
    pub(crate) size: usize,
    state: Mutex<SegmentState>,
    condvar: Condvar,
}

// Safety: `start` points into the shared `BackingRegion`, which outlives
// every `Segment` derived from it; all header access goes through `state`.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates a segment spanning `[start, start + size)`, with a single
    /// free header covering the whole range minus one header.
    ///
    /// # Safety
    /// `[start, start + size)` must be valid, writable, and exclusive to
    /// this segment; `size` must be at least `HEADER_SIZE`.
    pub(crate) unsafe fn new(id: usize, start: *mut u8, size: usize) -> Self {
        let header = start.cast::<BlockHeader>();
        let payload_size = size - crate::header::HEADER_SIZE;
        unsafe {
            BlockHeader::write_free(header, payload_size, id);
        }
        Segment {
            id,
            start,
            size,
            state: Mutex::new(SegmentState { free_list_head: header }),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, SegmentState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn condvar(&self) -> &Condvar {
        &self.condvar
    }

    /// Whether `payload` lies within this segment's byte range.
    pub(crate) fn contains(&self, payload: *const u8) -> bool {
        let start = self.start as usize;
        let end = start + self.size;
        let addr = payload as usize;
        addr >= start && addr < end
    }
}

impl SegmentState {
    /// True once this segment has collapsed back to a single free block
    /// spanning the whole segment (used by tests and by `Drop`).
    pub(crate) fn is_fully_free(&self, segment_size: usize) -> bool {
        !self.free_list_head.is_null()
            && unsafe { ptr::read(&(*self.free_list_head).next) }.is_null()
            && unsafe { (*self.free_list_head).size } == segment_size - crate::header::HEADER_SIZE
    }
}
