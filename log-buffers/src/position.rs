//! The consumer-managed position limit a publisher is back-pressured against.
//!
//! In the real system this counter lives in a shared-memory "counters" file the media driver
//! writes and every publication maps read-only. This crate does not own that counters file (out
//! of scope, per the purpose and scope section), so it exposes the same `ReadablePosition`
//! contract over a plain `Arc<AtomicI64>`: a test harness (or, eventually, a counters-file crate)
//! can hand a `Publication` anything that implements it.

use core::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Read-only view of a position counter maintained by someone else.
///
/// `Publication` only ever calls `get_volatile`, with acquire ordering, matching "Consumer
/// position limit: acquire load by the writer."
pub trait ReadablePosition {
    fn get_volatile(&self) -> i64;
}

/// A shared, atomically updated position counter.
///
/// Cloning shares the same backing cell: one clone can play the role of the media driver
/// advancing the limit, while another is handed to a `Publication` as its `ReadablePosition`.
#[derive(Clone)]
pub struct AtomicPosition {
    value: Arc<AtomicI64>,
}

impl AtomicPosition {
    pub fn new(initial: i64) -> Self {
        AtomicPosition {
            value: Arc::new(AtomicI64::new(initial)),
        }
    }

    /// Advance the counter, as the media driver would when a subscriber reports progress.
    pub fn set_ordered(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }
}

impl ReadablePosition for AtomicPosition {
    fn get_volatile(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_clone_observes_updates() {
        let limit = AtomicPosition::new(0);
        let writer_view = limit.clone();
        limit.set_ordered(4096);
        assert_eq!(writer_view.get_volatile(), 4096);
    }
}
