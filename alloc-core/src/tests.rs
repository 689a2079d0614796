use crate::allocator::{
    SegmentedAllocator, LARGE_THRESHOLD, NUM_SEGMENTS, SMALL_SEGMENT_SIZE, WAIT_TIMEOUT,
};
use crate::header::HEADER_SIZE;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn small_segment_capacity() -> usize {
    SMALL_SEGMENT_SIZE - HEADER_SIZE
}

#[test]
fn trivial_round_trip() {
    let alloc = SegmentedAllocator::new();
    let p = alloc.allocate(100).expect("fresh allocator has room for 100 bytes");

    assert_eq!(alloc.segment_of(p), Some(0));
    alloc.check_segment_invariants(0);

    alloc.release(p);
    assert!(alloc.segment_is_fully_free(0));
    assert_eq!(alloc.segment_free_block_count(0), 1);
    alloc.check_segment_invariants(0);
}

#[test]
fn split_and_merge() {
    let alloc = SegmentedAllocator::new();

    // Round-robin assigns segment 0 to the 1st, 5th, and 9th calls; burn
    // the three calls in between on other segments so `a`, `b`, `c` land
    // consecutively in segment 0's own address space.
    let land_on_segment_zero = |alloc: &SegmentedAllocator| {
        let p = alloc.allocate(200).unwrap();
        for _ in 0..(NUM_SEGMENTS - 2) {
            let filler = alloc.allocate(16).unwrap();
            alloc.release(filler);
        }
        p
    };

    let a = land_on_segment_zero(&alloc);
    let b = land_on_segment_zero(&alloc);
    let c = land_on_segment_zero(&alloc);
    assert_eq!(alloc.segment_of(a), Some(0));
    assert_eq!(alloc.segment_of(b), Some(0));
    assert_eq!(alloc.segment_of(c), Some(0));

    alloc.release(b);
    // `b` is now a free interior block, distinct from the still-free tail
    // remainder left after carving `c` off the original block.
    assert_eq!(alloc.segment_free_block_count(0), 2);
    alloc.check_segment_invariants(0);

    alloc.release(a);
    // `a` and `b` are address-adjacent and both free: they coalesce, but
    // the tail remainder stays a separate free block.
    assert_eq!(alloc.segment_free_block_count(0), 2);
    alloc.check_segment_invariants(0);

    alloc.release(c);
    // `c` coalesces with the merged a+b block on its left and the tail
    // remainder on its right: segment 0 is one free block again.
    assert!(alloc.segment_is_fully_free(0));
    alloc.check_segment_invariants(0);
}

#[test]
fn no_split_below_threshold() {
    let alloc = SegmentedAllocator::new();

    // One byte below MIN_SPLIT + HEADER_SIZE of slack: the whole segment
    // must go to the single allocation, with no tail block carved off.
    let payload = small_segment_capacity() - 31;
    let p = alloc.allocate(payload).unwrap();
    assert_eq!(alloc.segment_of(p), Some(0));
    assert_eq!(alloc.segment_free_block_count(0), 0);
    alloc.check_segment_invariants(0);

    alloc.release(p);
    assert!(alloc.segment_is_fully_free(0));
}

#[test]
fn large_allocation_routes_to_large_segment() {
    let alloc = SegmentedAllocator::new();
    let big = LARGE_THRESHOLD + 1;
    let p = alloc.allocate(big).expect("large segment has ample room");
    assert_eq!(alloc.segment_of(p), Some(NUM_SEGMENTS - 1));

    let (start, end) = alloc.segment_bounds(0);
    assert!((p as usize) < start || (p as usize) >= end, "large alloc must not touch segment 0");

    alloc.release(p);
}

#[test]
fn round_robin_assigns_small_segments_in_order() {
    let alloc = SegmentedAllocator::new();
    let expected: Vec<usize> = (0..12).map(|i| i % (NUM_SEGMENTS - 1)).collect();

    let mut actual = Vec::new();
    for _ in 0..12 {
        let p = alloc.allocate(64).unwrap();
        actual.push(alloc.segment_of(p).unwrap());
    }

    assert_eq!(actual, expected);
}

#[test]
fn exhaustion_times_out_then_recovers() {
    let alloc = Arc::new(SegmentedAllocator::new());
    let full = small_segment_capacity();

    // Exhaust all four small segments, one full-segment allocation each,
    // via round-robin (segments 0, 1, 2, 3 in turn on a fresh allocator).
    let mut exhausting = Vec::new();
    for _ in 0..(NUM_SEGMENTS - 1) {
        exhausting.push(alloc.allocate(full).unwrap());
    }

    let worker_alloc = Arc::clone(&alloc);
    let worker = thread::spawn(move || {
        let start = Instant::now();
        let result = worker_alloc.allocate(64);
        (result, start.elapsed())
    });
    let (result, elapsed) = worker.join().unwrap();

    assert!(result.is_none(), "every small segment is full, so this must time out");
    assert!(
        elapsed >= WAIT_TIMEOUT,
        "must have waited at least one segment's timeout, waited {elapsed:?}"
    );
    assert!(
        elapsed < WAIT_TIMEOUT * (NUM_SEGMENTS as u32),
        "should not wait much past one timeout per small segment, waited {elapsed:?}"
    );

    for p in exhausting {
        alloc.release(p);
    }

    let p = alloc.allocate(64).expect("segments are free again");
    alloc.release(p);
}

#[test]
fn teardown_allows_reinitialization() {
    let alloc = SegmentedAllocator::new();
    let p = alloc.allocate(1024).unwrap();
    alloc.release(p);

    alloc.teardown();

    let p2 = alloc.allocate(1024).expect("allocate re-initializes after teardown");
    assert_eq!(alloc.segment_of(p2), Some(0), "fresh allocator starts routing at segment 0 again");
    alloc.release(p2);
}

#[test]
fn concurrent_workload_preserves_invariants() {
    let alloc = Arc::new(SegmentedAllocator::new());
    let mut handles = Vec::new();

    for _ in 0..8 {
        let alloc = Arc::clone(&alloc);
        handles.push(thread::spawn(move || {
            for i in 0..200usize {
                let size = 16 + (i % 900);
                if let Some(p) = alloc.allocate(size) {
                    alloc.release(p);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for id in 0..NUM_SEGMENTS {
        alloc.check_segment_invariants(id);
    }

    // A workload with no outstanding allocations at the end should have
    // reduced every segment back to one free block (law L1).
    for id in 0..NUM_SEGMENTS {
        assert!(alloc.segment_is_fully_free(id), "segment {id} did not fully coalesce back down");
    }
}

#[test]
fn release_of_null_is_a_no_op() {
    let alloc = SegmentedAllocator::new();
    alloc.release(std::ptr::null_mut());
    // Allocator must still be usable afterwards.
    let p = alloc.allocate(16).unwrap();
    alloc.release(p);
}
