//! The public allocator facade: one-shot initialization, segment routing,
//! blocking-with-timeout waits, and teardown.

use crate::error::AllocError;
use crate::free_list;
use crate::header::BlockHeader;
use crate::region::BackingRegion;
use crate::segment::{Segment, SegmentState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Total capacity of the backing region (`C`).
pub const TOTAL_CAPACITY: usize = 100 * 1024 * 1024;

/// Number of independently-locked segments (`N`).
pub const NUM_SEGMENTS: usize = 5;

/// Below this much leftover payload, a split keeps the whole block rather
/// than carving off a remainder too small to be useful.
pub const MIN_SPLIT: usize = free_list::MIN_SPLIT;

/// How long `allocate` waits for a segment to free up before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Requests above this payload size route directly to the large segment
/// instead of round-robining across the small ones.
pub const LARGE_THRESHOLD: usize = 4 * 1024 * 1024;

/// Byte size of each of the first `NUM_SEGMENTS - 1` small segments: 20% of
/// `TOTAL_CAPACITY`, split evenly across them.
pub const SMALL_SEGMENT_SIZE: usize = (TOTAL_CAPACITY * 20 / 100) / (NUM_SEGMENTS - 1);

/// Byte size of the dedicated large segment: 80% of `TOTAL_CAPACITY`.
pub const LARGE_SEGMENT_SIZE: usize = TOTAL_CAPACITY * 80 / 100;

/// The backing region plus the segment array carved out of it. Lives
/// behind an `Arc` so `allocate`/`release` can briefly touch the
/// allocator's init-state mutex and then operate lock-free with respect to
/// that outer mutex, relying on each segment's own lock for the rest.
struct Inner {
    // Kept alive only so the region is freed when `Inner` is dropped; the
    // segments hold the raw pointers actually used for access.
    _region: BackingRegion,
    segments: Vec<Segment>,
}

impl Inner {
    fn new() -> Result<Self, AllocError> {
        let region = BackingRegion::acquire(TOTAL_CAPACITY).ok_or(AllocError::HostAllocationFailed)?;

        let mut segments = Vec::with_capacity(NUM_SEGMENTS);
        let mut offset = 0usize;
        for id in 0..NUM_SEGMENTS {
            let size = if id < NUM_SEGMENTS - 1 { SMALL_SEGMENT_SIZE } else { LARGE_SEGMENT_SIZE };
            let start = unsafe { region.as_ptr().add(offset) };
            segments.push(unsafe { Segment::new(id, start, size) });
            offset += size;
        }
        debug_assert_eq!(offset, TOTAL_CAPACITY);

        log::info!(
            "segmented allocator initialized: {NUM_SEGMENTS} segments, {TOTAL_CAPACITY} bytes total \
             ({} small segments of {SMALL_SEGMENT_SIZE} bytes, 1 large segment of {LARGE_SEGMENT_SIZE} bytes)",
            NUM_SEGMENTS - 1
        );

        Ok(Inner { _region: region, segments })
    }
}

/// A fixed-capacity, segmented, thread-safe general-purpose allocator.
///
/// Construct one with [`SegmentedAllocator::new`] and share it across
/// threads behind an [`std::sync::Arc`]; the backing region and segment
/// array are lazily created on first use and torn down by
/// [`SegmentedAllocator::teardown`].
///
/// `allocate`/`release` operate on raw `*mut u8` payload pointers rather
/// than a safe wrapper type: the allocator's blocking-with-timeout
/// semantics have no representation in `GlobalAlloc`/`Allocator`, so the
/// pointer contract is documented here instead.
///
/// # Safety contract
/// - A pointer returned by [`SegmentedAllocator::allocate`] is valid for
///   reads and writes of the requested size until passed to
///   [`SegmentedAllocator::release`].
/// - Each returned pointer must be released at most once.
/// - [`SegmentedAllocator::teardown`] must only be called once every
///   outstanding pointer has been released.
pub struct SegmentedAllocator {
    state: Mutex<Option<Arc<Inner>>>,
    round_robin: AtomicUsize,
}

impl Default for SegmentedAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentedAllocator {
    /// Creates a handle with no backing region yet; initialization happens
    /// lazily on the first call to [`SegmentedAllocator::allocate`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            round_robin: AtomicUsize::new(0),
        }
    }

    fn ensure_initialized(&self) -> Result<Arc<Inner>, AllocError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(inner) = guard.as_ref() {
            return Ok(Arc::clone(inner));
        }
        let inner = Arc::new(Inner::new()?);
        *guard = Some(Arc::clone(&inner));
        Ok(inner)
    }

    /// Requests `payload_size` bytes. Returns a payload pointer on success,
    /// or `None` on initialization failure, exhaustion, or an
    /// unsatisfiable (over-capacity) request.
    ///
    /// # Panics
    /// Panics in debug builds if `payload_size` is zero; zero-size
    /// requests are a contract violation, not a recoverable error.
    pub fn allocate(&self, payload_size: usize) -> Option<*mut u8> {
        debug_assert!(payload_size > 0, "allocate() requires a strictly positive size");

        let inner = match self.ensure_initialized() {
            Ok(inner) => inner,
            Err(err) => {
                log::warn!("allocate({payload_size}) failed during initialization: {err}");
                return None;
            }
        };

        // Round-robin counter: advances on every call regardless of
        // outcome, shared across all threads via a single atomic.
        let seg_id = self.round_robin.fetch_add(1, Ordering::Relaxed) % (NUM_SEGMENTS - 1);

        if let Some(block) = Self::try_fast_path(&inner, seg_id, payload_size) {
            log::trace!("allocate({payload_size}) satisfied on segment {seg_id} without waiting");
            return Some(unsafe { BlockHeader::payload(block) });
        }

        let outcome = if payload_size <= LARGE_THRESHOLD {
            let mut found = None;
            for candidate in 0..NUM_SEGMENTS - 1 {
                if let Some((state, block)) = Self::wait_for_free_block(&inner, candidate, payload_size) {
                    found = Some((candidate, state, block));
                    break;
                }
            }
            found
        } else {
            Self::wait_for_free_block(&inner, NUM_SEGMENTS - 1, payload_size)
                .map(|(state, block)| (NUM_SEGMENTS - 1, state, block))
        };

        match outcome {
            Some((seg_id, mut state, block)) => {
                unsafe {
                    (*block).segment_id = seg_id;
                    free_list::split_block(&mut state.free_list_head, block, payload_size);
                }
                log::debug!("allocate({payload_size}) satisfied on segment {seg_id} after waiting");
                Some(unsafe { BlockHeader::payload(block) })
            }
            None => {
                let err = if payload_size > TOTAL_CAPACITY {
                    AllocError::OverCapacity
                } else {
                    AllocError::Exhausted
                };
                log::warn!("allocate({payload_size}) returned None: {err}");
                None
            }
        }
    }

    /// Best-fit against `seg_id`'s current free list; on a hit, splits and
    /// marks the block allocated before releasing the segment's lock.
    fn try_fast_path(inner: &Inner, seg_id: usize, need: usize) -> Option<*mut BlockHeader> {
        let segment = &inner.segments[seg_id];
        let mut state = segment.lock();
        let block = unsafe { free_list::find_best_fit(state.free_list_head, need) };
        if block.is_null() {
            return None;
        }
        unsafe {
            free_list::split_block(&mut state.free_list_head, block, need);
        }
        Some(block)
    }

    /// Blocks on `segment`'s condition variable, bounded by
    /// [`WAIT_TIMEOUT`], until a block of at least `need` payload bytes is
    /// free. Returns the still-locked segment state together with the
    /// block so the caller can split and mark it allocated atomically,
    /// without giving a second waiter the chance to claim it first.
    fn wait_for_free_block<'a>(
        inner: &'a Inner,
        segment_idx: usize,
        need: usize,
    ) -> Option<(MutexGuard<'a, SegmentState>, *mut BlockHeader)> {
        let segment = &inner.segments[segment_idx];
        let mut state = segment.lock();
        let deadline = Instant::now() + WAIT_TIMEOUT;

        loop {
            let block = unsafe { free_list::find_best_fit(state.free_list_head, need) };
            if !block.is_null() {
                return Some((state, block));
            }
            if need > TOTAL_CAPACITY {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = segment
                .condvar()
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if result.timed_out() {
                return None;
            }
        }
    }

    /// Releases a pointer previously returned by
    /// [`SegmentedAllocator::allocate`]. A null pointer is a no-op;
    /// anything else must be a live, not-yet-released allocation from this
    /// allocator, or behavior is undefined.
    pub fn release(&self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }

        let inner = {
            let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        let Some(inner) = inner else {
            return;
        };

        unsafe {
            let header = BlockHeader::from_payload(payload);
            let seg_id = (*header).segment_id;
            let segment = &inner.segments[seg_id];
            debug_assert_eq!(segment.id, seg_id, "header's segment_id does not match the segment it indexes");
            let mut state = segment.lock();

            // Reinsert first so the block is always reachable from the
            // free list, then look for address-adjacent free neighbors to
            // absorb (see the open-question resolution in SPEC_FULL.md on
            // why this doesn't trust the header's own possibly-stale
            // prev/next across the free/allocated transition).
            free_list::insert_free(&mut state.free_list_head, header);

            let mut merged = header;
            let left = free_list::find_left_neighbor(state.free_list_head, merged);
            if !left.is_null() {
                free_list::merge_blocks(&mut state.free_list_head, left, merged);
                merged = left;
            }
            let right = free_list::find_right_neighbor(state.free_list_head, merged);
            if !right.is_null() {
                free_list::merge_blocks(&mut state.free_list_head, merged, right);
            }

            drop(state);
            segment.condvar().notify_all();
        }
    }

    /// Destroys the backing region and every segment's lock. Only legal
    /// once every pointer handed out by this allocator has been released;
    /// a subsequent `allocate` re-initializes from scratch.
    pub fn teardown(&self) {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            log::info!("segmented allocator torn down");
        }
    }
}

/// Introspection used only by the invariant checks in `tests`; none of this
/// is part of the public contract.
#[cfg(test)]
impl SegmentedAllocator {
    pub(crate) fn segment_bounds(&self, id: usize) -> (usize, usize) {
        let inner = self.ensure_initialized().expect("init must succeed in tests");
        let seg = &inner.segments[id];
        let start = seg.start as usize;
        (start, start + seg.size)
    }

    pub(crate) fn segment_of(&self, payload: *mut u8) -> Option<usize> {
        let inner = self.ensure_initialized().ok()?;
        inner.segments.iter().position(|s| s.contains(payload))
    }

    pub(crate) fn segment_is_fully_free(&self, id: usize) -> bool {
        let inner = self.ensure_initialized().expect("init must succeed in tests");
        let seg = &inner.segments[id];
        let state = seg.lock();
        state.is_fully_free(seg.size)
    }

    pub(crate) fn segment_free_block_count(&self, id: usize) -> usize {
        let inner = self.ensure_initialized().expect("init must succeed in tests");
        let seg = &inner.segments[id];
        let state = seg.lock();
        let mut count = 0usize;
        let mut current = state.free_list_head;
        while !current.is_null() {
            count += 1;
            current = unsafe { (*current).next };
        }
        count
    }

    /// Walks every header in `id` in address order (free or allocated) and
    /// asserts invariant (I6): headers exactly tile the segment with no
    /// gaps or overlaps. Also checks (I1)/(I2)/(I4) for the free sublist.
    pub(crate) fn check_segment_invariants(&self, id: usize) {
        let inner = self.ensure_initialized().expect("init must succeed in tests");
        let seg = &inner.segments[id];
        let state = seg.lock();

        // (I1)/(I2): every free-listed block is marked free, owned by this
        // segment, and lies within its byte range.
        let (start, end) = (seg.start as usize, seg.start as usize + seg.size);
        let mut current = state.free_list_head;
        let mut free_addrs = std::collections::HashSet::new();
        while !current.is_null() {
            let node = unsafe { &*current };
            assert!(node.free, "free list contains a block not marked free");
            assert_eq!(node.segment_id, id, "free block claims the wrong segment id");
            let addr = current as usize;
            assert!(addr >= start && addr < end, "free block escaped its segment's byte range");
            assert!(free_addrs.insert(addr), "free list contains the same block twice");
            current = node.next;
        }

        // (I6): walking every header in address order, free or allocated,
        // exactly tiles the segment.
        let mut addr = seg.start;
        let seg_end = unsafe { seg.start.add(seg.size) };
        let mut total = 0usize;
        while (addr as usize) < (seg_end as usize) {
            let header = addr.cast::<BlockHeader>();
            let node = unsafe { &*header };
            assert_eq!(node.segment_id, id, "header claims the wrong segment id");
            let block_total = crate::header::HEADER_SIZE + node.size;
            total += block_total;
            addr = unsafe { addr.add(block_total) };
        }
        assert_eq!(addr, seg_end, "headers do not exactly tile the segment");
        assert_eq!(total, seg.size, "headers do not account for the full segment size");
    }
}
