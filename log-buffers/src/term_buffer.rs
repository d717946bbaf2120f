use core::sync::atomic::{AtomicI32, Ordering};

/// One partition of the log: a fixed-length byte region the appender writes frames into.
///
/// A term buffer only needs one atomic field per frame — its `frame_length` — because a single
/// writer owns the rest of the region outright for the lifetime of its reservation. Header and
/// payload bytes are plain, non-atomic stores; only the length field that makes a frame visible
/// to consumers needs ordering.
pub struct TermBuffer {
    base: *mut u8,
    len: usize,
}

// Safety: `TermBuffer` is handed out by `LogBuffers` alongside a metadata region it shares with
// exactly one writer at a time; call sites serialize writes through `TermAppender`'s raw-tail
// reservation, and reads are either confined to the owning process or happen through atomics.
unsafe impl Send for TermBuffer {}
unsafe impl Sync for TermBuffer {}

impl TermBuffer {
    /// Wrap a raw region of shared memory.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long as the returned
    /// `TermBuffer` is used, and no other `TermBuffer` may alias the same bytes.
    pub unsafe fn new(base: *mut u8, len: usize) -> Self {
        TermBuffer { base, len }
    }

    /// Length, in bytes, of this partition.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy bytes into the buffer at `offset`, non-atomically.
    ///
    /// # Panics
    ///
    /// Panics if `offset + data.len()` exceeds the buffer length — a caller bug, since every call
    /// site writes into a region it just reserved from the raw tail.
    pub fn write_bytes(&self, offset: u32, data: &[u8]) {
        let offset = offset as usize;
        assert!(offset + data.len() <= self.len, "write past end of term buffer");
        // Safety: bounds checked above; single-writer discipline is upheld by `TermAppender`.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.base.add(offset), data.len());
        }
    }

    /// Read bytes out of the buffer at `offset`. Used by tests and by anything re-reading what it
    /// just wrote (e.g. `BufferClaim::data`).
    pub fn read_bytes(&self, offset: u32, len: usize) -> &[u8] {
        let offset = offset as usize;
        assert!(offset + len <= self.len, "read past end of term buffer");
        // Safety: bounds checked above.
        unsafe { core::slice::from_raw_parts(self.base.add(offset), len) }
    }

    /// A mutable view of `len` bytes starting at `offset`, for zero-copy claims.
    ///
    /// # Safety
    ///
    /// The caller must ensure nothing else reads or writes this range concurrently with the
    /// mutable borrow's lifetime; `TermAppender::claim` upholds this by reserving the range from
    /// the raw tail before calling this.
    pub unsafe fn slice_mut(&self, offset: u32, len: usize) -> &mut [u8] {
        let offset = offset as usize;
        assert!(offset + len <= self.len, "slice past end of term buffer");
        core::slice::from_raw_parts_mut(self.base.add(offset), len)
    }

    fn frame_length_atomic(&self, frame_offset: u32) -> &AtomicI32 {
        assert!(
            frame_offset as usize + 4 <= self.len,
            "frame_length field past end of term buffer"
        );
        // Safety: bounds checked above; `AtomicI32` has the same size and representation as the
        // `i32` the frame layout reserves for `frame_length`, and the offset is 32-byte aligned
        // by construction (every frame is reserved at an aligned offset).
        unsafe { &*(self.base.add(frame_offset as usize) as *const AtomicI32) }
    }

    /// Read a frame's `frame_length` field with acquire ordering, as a consumer would.
    pub fn frame_length_volatile(&self, frame_offset: u32) -> i32 {
        self.frame_length_atomic(frame_offset).load(Ordering::Acquire)
    }

    /// Publish a frame's `frame_length` field with release ordering, making the frame visible.
    pub fn store_frame_length_ordered(&self, frame_offset: u32, length: i32) {
        self.frame_length_atomic(frame_offset).store(length, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_buffer(len: usize) -> TermBuffer {
        let mem = vec![0u8; len].into_boxed_slice();
        let base = Box::leak(mem).as_mut_ptr();
        unsafe { TermBuffer::new(base, len) }
    }

    #[test]
    fn write_then_read_round_trips() {
        let buf = leaked_buffer(4096);
        buf.write_bytes(32, b"hello");
        assert_eq!(buf.read_bytes(32, 5), b"hello");
    }

    #[test]
    fn frame_length_publishes_with_release_and_reads_with_acquire() {
        let buf = leaked_buffer(4096);
        buf.store_frame_length_ordered(0, -128);
        assert_eq!(buf.frame_length_volatile(0), -128);
        buf.store_frame_length_ordered(0, 128);
        assert_eq!(buf.frame_length_volatile(0), 128);
    }
}
