//! Zero-copy handle over a reserved region of a term buffer.

use log_buffers::TermBuffer;

use crate::frame;

/// Ownership token over a frame's payload region, handed out by [`crate::Publication::try_claim`].
///
/// The frame is reserved but not yet visible to consumers (its length field carries the negative
/// sentinel) until `commit` publishes it, or `abort` turns it into a padding frame. Using the
/// claim after either is a bug: both consume `self`, so the type system rules out calling them
/// twice; a claim dropped without either is treated the same as `abort` (see `Drop`), so a
/// forgotten claim cannot wedge every consumer behind a permanently negative-length frame.
pub struct BufferClaim<'a> {
    term: &'a TermBuffer,
    frame_offset: u32,
    aligned_length: u32,
    payload_length: u32,
    released: bool,
}

impl<'a> BufferClaim<'a> {
    pub(crate) fn new(
        term: &'a TermBuffer,
        frame_offset: u32,
        aligned_length: u32,
        payload_length: u32,
    ) -> Self {
        BufferClaim {
            term,
            frame_offset,
            aligned_length,
            payload_length,
            released: false,
        }
    }

    /// Mutable view of the payload region, `payload_length` bytes starting right after the
    /// header.
    pub fn data(&mut self) -> &mut [u8] {
        // Safety: this region was reserved exclusively for this claim by `TermAppender::claim`
        // and is not released until `commit`/`abort` consumes `self`.
        unsafe {
            self.term
                .slice_mut(self.frame_offset + frame::HEADER_LENGTH as u32, self.payload_length as usize)
        }
    }

    /// Overwrite the `reserved_value` header field, e.g. from a checksum computed over `data()`.
    pub fn set_reserved_value(&mut self, value: i64) {
        // Safety: same region as `data`, disjoint from it (header vs. payload bytes).
        let header = unsafe { self.term.slice_mut(self.frame_offset, frame::HEADER_LENGTH) };
        frame::set_reserved_value(header, value);
    }

    /// Publish the frame: stores the positive frame length with release ordering, making it
    /// visible to consumers.
    pub fn commit(mut self) {
        self.released = true;
        self.term
            .store_frame_length_ordered(self.frame_offset, self.aligned_length as i32);
    }

    /// Void the frame: rewrites it as a padding frame (same numeric length, type `PADDING`, both
    /// flags set) so consumers skip over it, then publishes that length.
    pub fn abort(mut self) {
        self.released = true;
        self.void();
    }

    fn void(&self) {
        // Safety: still exclusively ours; not yet published.
        let header = unsafe { self.term.slice_mut(self.frame_offset, frame::HEADER_LENGTH) };
        frame::set_type(header, frame::TYPE_PAD);
        frame::set_flags(header, frame::BEGIN_FLAG | frame::END_FLAG);
        self.term
            .store_frame_length_ordered(self.frame_offset, self.aligned_length as i32);
    }
}

impl Drop for BufferClaim<'_> {
    fn drop(&mut self) {
        if !self.released {
            crate::trace_event!("buffer claim dropped without commit/abort, voiding as padding"; offset = self.frame_offset);
            self.void();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_term(len: usize) -> TermBuffer {
        let mem = vec![0u8; len].into_boxed_slice();
        let base = Box::leak(mem).as_mut_ptr();
        unsafe { TermBuffer::new(base, len) }
    }

    #[test]
    fn commit_publishes_positive_length() {
        let term = leaked_term(128);
        let claim = BufferClaim::new(&term, 0, 64, 32);
        claim.commit();
        assert_eq!(term.frame_length_volatile(0), 64);
    }

    #[test]
    fn abort_publishes_padding_frame() {
        let term = leaked_term(128);
        let claim = BufferClaim::new(&term, 0, 64, 32);
        claim.abort();
        assert_eq!(term.frame_length_volatile(0), 64);
        let header = term.read_bytes(0, frame::HEADER_LENGTH);
        assert!(frame::is_padding(frame::frame_type(header), frame::flags(header)));
    }

    #[test]
    fn data_writes_land_in_payload_region() {
        let term = leaked_term(128);
        let mut claim = BufferClaim::new(&term, 0, 64, 5);
        claim.data().copy_from_slice(b"hello");
        claim.commit();
        assert_eq!(term.read_bytes(frame::HEADER_LENGTH as u32, 5), b"hello");
    }

    #[test]
    fn dropped_without_release_voids_as_padding() {
        let term = leaked_term(128);
        {
            let mut claim = BufferClaim::new(&term, 0, 64, 5);
            claim.data().copy_from_slice(b"hello");
        }
        assert_eq!(term.frame_length_volatile(0), 64);
        let header = term.read_bytes(0, frame::HEADER_LENGTH);
        assert!(frame::is_padding(frame::frame_type(header), frame::flags(header)));
    }
}
