//! Internal error type for the allocator's fallible paths.
//!
//! The public `allocate` boundary collapses every variant to `None`, per
//! the allocator's null-returning contract; this type exists so the
//! internal plumbing can use `?` and so `log::warn!` can report *why* a
//! request failed before the reason is dropped at the boundary.

/// Why an internal allocation attempt did not produce a block.
#[derive(Debug, thiserror::Error)]
pub(crate) enum AllocError {
    /// The host allocator refused to hand over the backing region or the
    /// segment array during one-shot initialization.
    #[error("host allocator refused to provide the backing region")]
    HostAllocationFailed,

    /// No segment admitted the request before the wait timeout elapsed.
    #[error("no segment had a suitable free block before the wait timeout")]
    Exhausted,

    /// The requested size can never be satisfied, even by a fully-free
    /// allocator (`need > total capacity`).
    #[error("requested size exceeds total allocator capacity")]
    OverCapacity,
}
