//! Pure free-list operations over a segment's intrusive list.
//!
//! Every function here assumes the caller already holds the owning
//! segment's lock; none of them touch a mutex themselves.

use crate::header::{BlockHeader, HEADER_SIZE};
use core::ptr;

/// Below this much leftover payload (plus a header), a split keeps the whole
/// block rather than carving off a remainder too small to be useful.
pub(crate) const MIN_SPLIT: usize = 32;

/// Returns the smallest free block in the list rooted at `head` whose
/// payload is at least `need` bytes, or null if none qualifies. Ties go to
/// whichever block is encountered first.
///
/// # Safety
/// Caller holds the owning segment's lock; every node reachable from `head`
/// is a valid, currently-free [`BlockHeader`].
pub(crate) unsafe fn find_best_fit(head: *mut BlockHeader, need: usize) -> *mut BlockHeader {
    let mut best: *mut BlockHeader = ptr::null_mut();
    let mut current = head;
    while !current.is_null() {
        let node = unsafe { &*current };
        debug_assert!(node.free);
        if node.size >= need && (best.is_null() || node.size < unsafe { (*best).size }) {
            best = current;
        }
        current = node.next;
    }
    best
}

/// Pushes `block` onto the head of the free list rooted at `*head`,
/// marking it free.
///
/// # Safety
/// Caller holds the owning segment's lock; `block` must not already be
/// linked into any free list.
pub(crate) unsafe fn insert_free(head: &mut *mut BlockHeader, block: *mut BlockHeader) {
    unsafe {
        (*block).free = true;
        (*block).prev = ptr::null_mut();
        (*block).next = *head;
        if !(*head).is_null() {
            (**head).prev = block;
        }
        *head = block;
    }
}

/// Carves `block` down to exactly `payload` bytes and marks it allocated,
/// reinserting a free remainder if the leftover is at least
/// `MIN_SPLIT + HEADER_SIZE` bytes. `block` is unlinked from the free list
/// as part of this call, not before it.
///
/// # Safety
/// Caller holds the owning segment's lock; `block` is currently free,
/// linked into the list rooted at `*head`, and `block.size >= payload`.
pub(crate) unsafe fn split_block(head: &mut *mut BlockHeader, block: *mut BlockHeader, payload: usize) {
    unsafe {
        debug_assert!((*block).free);
        debug_assert!((*block).size >= payload);

        let remainder = (*block).size - payload;
        if remainder >= MIN_SPLIT + HEADER_SIZE {
            let rest = (block as *mut u8).add(HEADER_SIZE + payload).cast::<BlockHeader>();
            BlockHeader::write_free(rest, remainder - HEADER_SIZE, (*block).segment_id);

            // Splice `rest` into `block`'s current list position.
            (*rest).next = (*block).next;
            if !(*rest).next.is_null() {
                (*(*rest).next).prev = rest;
            }
            (*rest).prev = (*block).prev;
            (*block).next = rest;

            (*block).size = payload;
        }

        // Unlink `block`. If a remainder was spliced in above, `block.next`
        // now points at it, so this closes the gap around `block` cleanly
        // either way.
        if !(*block).prev.is_null() {
            (*(*block).prev).next = (*block).next;
        }
        if !(*block).next.is_null() {
            (*(*block).next).prev = (*block).prev;
        }
        if *head == block {
            *head = (*block).next;
        }

        (*block).free = false;
    }
}

/// Merges `right` into `left`. `right` must be `left`'s immediate right
/// neighbor in *address* order within the same segment — not necessarily
/// its neighbor in free-list link order, since callers locate merge
/// candidates by address scan, not by walking the list. `right` is
/// unlinked from wherever it sits in the free list and its header is
/// retired and must never be referenced again; `left` keeps its own
/// existing list position untouched (only its `size` grows), so a merge
/// never has to guess at — or clobber — `left`'s real list neighbors.
///
/// # Safety
/// Caller holds the owning segment's lock; `left` and `right` are both
/// free, and `right` begins exactly where `left`'s payload ends.
pub(crate) unsafe fn merge_blocks(head: &mut *mut BlockHeader, left: *mut BlockHeader, right: *mut BlockHeader) {
    unsafe {
        debug_assert!((*left).free && (*right).free);
        debug_assert_eq!(BlockHeader::end_addr(left), right);

        if !(*right).prev.is_null() {
            (*(*right).prev).next = (*right).next;
        }
        if !(*right).next.is_null() {
            (*(*right).next).prev = (*right).prev;
        }
        if *head == right {
            *head = (*right).next;
        }

        (*left).size += HEADER_SIZE + (*right).size;
    }
}

/// Finds the free block in the list rooted at `head`, if any, whose payload
/// ends exactly where `block` begins.
///
/// # Safety
/// Caller holds the owning segment's lock.
pub(crate) unsafe fn find_left_neighbor(head: *mut BlockHeader, block: *mut BlockHeader) -> *mut BlockHeader {
    let mut current = head;
    while !current.is_null() {
        if current != block && unsafe { BlockHeader::end_addr(current) } == block {
            return current;
        }
        current = unsafe { (*current).next };
    }
    ptr::null_mut()
}

/// Finds the free block in the list rooted at `head`, if any, that begins
/// exactly where `block`'s payload ends.
///
/// # Safety
/// Caller holds the owning segment's lock.
pub(crate) unsafe fn find_right_neighbor(head: *mut BlockHeader, block: *mut BlockHeader) -> *mut BlockHeader {
    let expected = unsafe { BlockHeader::end_addr(block) };
    let mut current = head;
    while !current.is_null() {
        if current != block && current == expected {
            return current;
        }
        current = unsafe { (*current).next };
    }
    ptr::null_mut()
}
