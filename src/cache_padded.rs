//! Cache-line padded atomic counter shared by the ring buffer
//! implementations, so the writer-owned and reader-owned cursors never
//! share a cache line and bounce between the producer's and consumer's
//! cores on every access.

use std::sync::atomic::AtomicUsize;

#[repr(align(64))]
pub(crate) struct CachePadded(pub(crate) AtomicUsize);

impl CachePadded {
    pub(crate) fn new(value: usize) -> Self {
        Self(AtomicUsize::new(value))
    }
}
