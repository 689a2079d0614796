//! # Segmented General-Purpose Allocator
//!
//! A fixed-capacity, segmented, thread-safe allocator layered over a
//! single contiguous region obtained once from the host allocator.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SegmentedAllocator (facade)             │
//! │   • one-shot lazy init    • round-robin routing          │
//! │   • blocking wait + timeout   • teardown                 │
//! └─────────────────┬─────────────────────────────────────────┘
//!                   │
//! ┌─────────────────▼─────────────────────────────────────────┐
//! │                        Segment × 5                        │
//! │   • own mutex + condition variable                        │
//! │   • intrusive doubly-linked free list                     │
//! │   • best-fit / split / coalesce                           │
//! └─────────────────┬─────────────────────────────────────────┘
//!                   │
//! ┌─────────────────▼─────────────────────────────────────────┐
//! │                     BackingRegion                          │
//! │   • one contiguous allocation from the host allocator       │
//! │   • carved end-to-end into the five segments above          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! - [`allocator::SegmentedAllocator`]: the public surface —
//!   `allocate`/`release`/`teardown`.
//! - `segment`: one independently-locked sub-range of the backing region.
//! - `free_list`: pure best-fit/split/merge/insert helpers over a
//!   segment's intrusive list.
//! - `header`: the in-band metadata prefixing every block.
//! - `region`: the one-shot backing allocation.
//!
//! Of the five segments, the first four are small (5% of total capacity
//! each) and serve round-robin for requests up to [`allocator::LARGE_THRESHOLD`];
//! the fifth is a dedicated large segment for everything above it.
//!
//! ## Safety Model
//!
//! Headers are manipulated through raw pointers in a deliberately
//! `unsafe` interior (`header`, `free_list`, parts of `segment` and
//! `allocator`). The safety contract those modules share: every header
//! access happens while the owning segment's lock is held, and a block's
//! `prev`/`next` links are only meaningful while it is free. The public
//! facade in `allocator` is the only safe-to-call surface; see its
//! module-level docs for the pointer contract `allocate`/`release` share.

mod allocator;
mod error;
mod free_list;
mod header;
mod region;
mod segment;

pub use allocator::{
    SegmentedAllocator, LARGE_SEGMENT_SIZE, LARGE_THRESHOLD, MIN_SPLIT, NUM_SEGMENTS,
    SMALL_SEGMENT_SIZE, TOTAL_CAPACITY, WAIT_TIMEOUT,
};

#[cfg(test)]
mod tests;
