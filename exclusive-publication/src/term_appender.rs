//! Single-writer append into one partition: reserve via atomic tail bump, write header and
//! payload, publish the frame length.

use core::sync::atomic::{AtomicU64, Ordering};

use log_buffers::{RawTail, TermBuffer};

use crate::buffer_claim::BufferClaim;
use crate::frame;
use crate::header::HeaderWriter;

/// Optional per-frame callback computing the `reserved_value` header field.
///
/// Runs after the payload has been copied into the term buffer, so it may observe the final
/// bytes (e.g. to stamp a checksum).
pub type ReservedValueSupplier<'a> = Option<&'a mut dyn FnMut(&[u8]) -> i64>;

/// Outcome of an append attempt: either the new term offset to resume appending at, or a
/// notification that the partition tripped (a padding frame was written covering the remainder;
/// the caller must rotate and retry in the next term).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    Advanced(u32),
    Tripped,
}

/// Owns one partition: a term buffer plus the raw tail word describing its next free byte.
///
/// Holds only references; cheap to construct on every call rather than cached, since the
/// `Publication` that owns the backing `LogBuffers` is the only thing with a long enough
/// lifetime to hold onto one.
#[derive(Clone, Copy)]
pub struct TermAppender<'a> {
    term: &'a TermBuffer,
    raw_tail: &'a AtomicU64,
    partition_index: usize,
}

enum Reservation {
    Reserved { offset: u32 },
    Tripped,
}

impl<'a> TermAppender<'a> {
    pub fn new(term: &'a TermBuffer, raw_tail: &'a AtomicU64, partition_index: usize) -> Self {
        TermAppender {
            term,
            raw_tail,
            partition_index,
        }
    }

    pub fn partition_index(&self) -> usize {
        self.partition_index
    }

    /// Observe this partition's raw tail with acquire ordering, as an external reader would.
    pub fn raw_tail_volatile(&self) -> RawTail {
        RawTail::unpack(self.raw_tail.load(Ordering::Acquire) as i64)
    }

    /// Arm this partition's raw tail for the term it will hold once rotation reaches it.
    ///
    /// Called by `Publication` the moment it rotates into the *next* partition, so that by the
    /// time a writer reaches this partition again its raw tail already carries the expected term
    /// id at offset zero (invariant 4).
    pub fn tail_term_id(&self, next_term_id: i32) {
        self.raw_tail
            .store(RawTail::pack(next_term_id, 0).into_raw() as u64, Ordering::Relaxed);
    }

    fn reserve(&self, term_id: i32, header: &HeaderWriter, required: u32) -> Reservation {
        let term_length = self.term.len() as u32;
        loop {
            let current = RawTail::unpack(self.raw_tail.load(Ordering::Relaxed) as i64);
            debug_assert_eq!(
                current.term_id(),
                term_id,
                "raw tail term id diverged from the writer's own term id"
            );
            let tail_offset = current.tail_offset();

            if tail_offset >= term_length {
                // Another attempt already tripped this partition (defensive; does not occur with
                // a single writer, since the writer itself would have rotated already).
                return Reservation::Tripped;
            }

            let would_reach = tail_offset as u64 + required as u64;
            if would_reach > term_length as u64 {
                let padding_length = term_length - tail_offset;
                let new_raw = RawTail::pack(term_id, term_length);
                let swapped = self.raw_tail.compare_exchange(
                    current.into_raw() as u64,
                    new_raw.into_raw() as u64,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
                if swapped.is_ok() {
                    self.write_padding_frame(header, term_id, tail_offset, padding_length);
                    return Reservation::Tripped;
                }
                continue;
            }

            let new_raw = RawTail::pack(term_id, tail_offset + required);
            let swapped = self.raw_tail.compare_exchange(
                current.into_raw() as u64,
                new_raw.into_raw() as u64,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            if swapped.is_ok() {
                return Reservation::Reserved { offset: tail_offset };
            }
        }
    }

    fn write_padding_frame(&self, header: &HeaderWriter, term_id: i32, offset: u32, length: u32) {
        crate::trace_event!("padding frame written"; offset = offset, length = length, term_id = term_id);
        // Safety: `offset..offset+length` was just claimed exclusively by the CAS above.
        let dst = unsafe { self.term.slice_mut(offset, length as usize) };
        header.write(dst, offset, length, term_id);
        frame::set_type(dst, frame::TYPE_PAD);
        frame::set_flags(dst, frame::BEGIN_FLAG | frame::END_FLAG);
        self.term.store_frame_length_ordered(offset, length as i32);
    }

    /// Append a message that fits in a single frame (flags `BEGIN | END`).
    ///
    /// A zero-length `src` still produces a header-only frame.
    pub fn append_unfragmented_message(
        &self,
        term_id: i32,
        header: &HeaderWriter,
        src: &[u8],
        mut reserved_value_supplier: ReservedValueSupplier<'_>,
    ) -> AppendResult {
        let required = frame::aligned_length(src.len());
        match self.reserve(term_id, header, required) {
            Reservation::Tripped => AppendResult::Tripped,
            Reservation::Reserved { offset } => {
                // Safety: `offset..offset+required` was just claimed exclusively above.
                let dst = unsafe { self.term.slice_mut(offset, required as usize) };
                header.write(dst, offset, required, term_id);
                frame::set_flags(dst, frame::BEGIN_FLAG | frame::END_FLAG);
                dst[frame::HEADER_LENGTH..frame::HEADER_LENGTH + src.len()].copy_from_slice(src);

                if let Some(supplier) = reserved_value_supplier.as_deref_mut() {
                    let payload = &dst[frame::HEADER_LENGTH..frame::HEADER_LENGTH + src.len()];
                    let value = supplier(payload);
                    frame::set_reserved_value(dst, value);
                }

                self.term.store_frame_length_ordered(offset, required as i32);
                AppendResult::Advanced(offset + required)
            }
        }
    }

    /// Split `src` into fragments of up to `max_payload_length` bytes, first `BEGIN`, last `END`,
    /// interior fragments unflagged. Reserves the total aligned length in one raw-tail update so
    /// either every fragment lands, or (on `TRIPPED`) none do.
    pub fn append_fragmented_message(
        &self,
        term_id: i32,
        header: &HeaderWriter,
        src: &[u8],
        max_payload_length: u32,
        mut reserved_value_supplier: ReservedValueSupplier<'_>,
    ) -> AppendResult {
        let max_payload = max_payload_length as usize;
        debug_assert!(max_payload > 0);

        let whole_fragments = src.len() / max_payload;
        let remaining_payload = src.len() % max_payload;
        let mut required: u64 = whole_fragments as u64 * frame::aligned_length(max_payload) as u64;
        if remaining_payload > 0 {
            required += frame::aligned_length(remaining_payload) as u64;
        }
        let required = required as u32;

        match self.reserve(term_id, header, required) {
            Reservation::Tripped => AppendResult::Tripped,
            Reservation::Reserved { offset } => {
                let mut frame_offset = offset;
                let mut src_offset = 0usize;
                let mut remaining = src.len();

                while remaining > 0 {
                    let bytes_to_write = remaining.min(max_payload);
                    let frame_len = frame::aligned_length(bytes_to_write);

                    // Safety: `frame_offset..frame_offset+frame_len` lies within the range just
                    // reserved above; fragments are laid out back to back within it.
                    let dst = unsafe { self.term.slice_mut(frame_offset, frame_len as usize) };
                    header.write(dst, frame_offset, frame_len, term_id);

                    let mut flags = 0u8;
                    if src_offset == 0 {
                        flags |= frame::BEGIN_FLAG;
                    }
                    remaining -= bytes_to_write;
                    if remaining == 0 {
                        flags |= frame::END_FLAG;
                    }
                    frame::set_flags(dst, flags);

                    dst[frame::HEADER_LENGTH..frame::HEADER_LENGTH + bytes_to_write]
                        .copy_from_slice(&src[src_offset..src_offset + bytes_to_write]);

                    if let Some(supplier) = reserved_value_supplier.as_deref_mut() {
                        let payload = &dst[frame::HEADER_LENGTH..frame::HEADER_LENGTH + bytes_to_write];
                        let value = supplier(payload);
                        frame::set_reserved_value(dst, value);
                    }

                    self.term.store_frame_length_ordered(frame_offset, frame_len as i32);

                    src_offset += bytes_to_write;
                    frame_offset += frame_len;
                }

                AppendResult::Advanced(frame_offset)
            }
        }
    }

    /// Reserve space for a zero-copy claim; the caller writes the payload themselves through the
    /// returned [`BufferClaim`] and must `commit` or `abort` it.
    pub fn claim(self, term_id: i32, header: &HeaderWriter, length: u32) -> ClaimOutcome<'a> {
        let required = frame::aligned_length(length as usize);
        match self.reserve(term_id, header, required) {
            Reservation::Tripped => ClaimOutcome::Tripped,
            Reservation::Reserved { offset } => {
                // Safety: `offset..offset+required` was just claimed exclusively above.
                let dst = unsafe { self.term.slice_mut(offset, required as usize) };
                header.write(dst, offset, required, term_id);
                frame::set_flags(dst, frame::BEGIN_FLAG | frame::END_FLAG);
                let claim = BufferClaim::new(self.term, offset, required, length);
                ClaimOutcome::Reserved {
                    resulting_offset: offset + required,
                    claim,
                }
            }
        }
    }
}

/// Outcome of [`TermAppender::claim`].
pub enum ClaimOutcome<'a> {
    Reserved { resulting_offset: u32, claim: BufferClaim<'a> },
    Tripped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaked_term(len: usize) -> TermBuffer {
        let mem = vec![0u8; len].into_boxed_slice();
        let base = Box::leak(mem).as_mut_ptr();
        unsafe { TermBuffer::new(base, len) }
    }

    fn header() -> HeaderWriter {
        HeaderWriter::new([0u8; frame::HEADER_LENGTH])
    }

    #[test]
    fn unfragmented_message_advances_by_aligned_length() {
        let term = leaked_term(4096);
        let raw_tail = AtomicU64::new(RawTail::pack(1, 0).into_raw() as u64);
        let appender = TermAppender::new(&term, &raw_tail, 0);

        let result = appender.append_unfragmented_message(1, &header(), b"hello", None);
        assert_eq!(result, AppendResult::Advanced(frame::aligned_length(5)));
        assert_eq!(
            term.frame_length_volatile(0),
            frame::aligned_length(5) as i32
        );
        assert_eq!(
            term.read_bytes(frame::HEADER_LENGTH as u32, 5),
            b"hello"
        );
    }

    #[test]
    fn zero_length_message_still_writes_header_only_frame() {
        let term = leaked_term(4096);
        let raw_tail = AtomicU64::new(RawTail::pack(1, 0).into_raw() as u64);
        let appender = TermAppender::new(&term, &raw_tail, 0);

        let result = appender.append_unfragmented_message(1, &header(), &[], None);
        assert_eq!(result, AppendResult::Advanced(frame::HEADER_LENGTH as u32));
    }

    #[test]
    fn reservation_straddling_term_end_trips_and_pads() {
        let term_length = 128;
        let term = leaked_term(term_length);
        // Leave 64 bytes free; a 96-byte-aligned message cannot fit.
        let raw_tail = AtomicU64::new(RawTail::pack(1, 64).into_raw() as u64);
        let appender = TermAppender::new(&term, &raw_tail, 0);

        let result = appender.append_unfragmented_message(1, &header(), &[0u8; 64], None);
        assert_eq!(result, AppendResult::Tripped);

        // The trailing 64 bytes were claimed as a padding frame.
        assert_eq!(term.frame_length_volatile(64), 64);
        let padding_header = term.read_bytes(64, frame::HEADER_LENGTH);
        assert!(frame::is_padding(
            frame::frame_type(padding_header),
            frame::flags(padding_header)
        ));

        let tail = RawTail::unpack(raw_tail.load(Ordering::Relaxed) as i64);
        assert_eq!(tail.tail_offset(), term_length as u32);
    }

    #[test]
    fn fragmented_message_splits_with_begin_and_end_flags() {
        let term = leaked_term(16 * 1024);
        let raw_tail = AtomicU64::new(RawTail::pack(1, 0).into_raw() as u64);
        let appender = TermAppender::new(&term, &raw_tail, 0);

        let max_payload = 1376u32;
        let message = vec![0xABu8; 4000];
        let result =
            appender.append_fragmented_message(1, &header(), &message, max_payload, None);

        let first_len = frame::aligned_length(1376);
        let second_len = frame::aligned_length(1376);
        let third_len = frame::aligned_length(4000 - 2 * 1376);
        assert_eq!(
            result,
            AppendResult::Advanced(first_len + second_len + third_len)
        );

        let first = term.read_bytes(0, frame::HEADER_LENGTH);
        let second = term.read_bytes(first_len, frame::HEADER_LENGTH);
        let third = term.read_bytes(first_len + second_len, frame::HEADER_LENGTH);

        assert_eq!(frame::flags(first), frame::BEGIN_FLAG);
        assert_eq!(frame::flags(second), 0);
        assert_eq!(frame::flags(third), frame::END_FLAG);

        let mut reassembled = Vec::new();
        reassembled.extend_from_slice(term.read_bytes(frame::HEADER_LENGTH as u32, 1376));
        reassembled.extend_from_slice(
            term.read_bytes(first_len + frame::HEADER_LENGTH as u32, 1376),
        );
        reassembled.extend_from_slice(
            term.read_bytes(first_len + second_len + frame::HEADER_LENGTH as u32, 4000 - 2 * 1376),
        );
        assert_eq!(reassembled, message);
    }

    #[test]
    fn fragmented_message_straddling_term_end_trips_entire_message() {
        let term_length = 4096;
        let term = leaked_term(term_length);
        let raw_tail = AtomicU64::new(RawTail::pack(1, term_length as u32 - 64).into_raw() as u64);
        let appender = TermAppender::new(&term, &raw_tail, 0);

        let message = vec![0u8; 4000];
        let result = appender.append_fragmented_message(1, &header(), &message, 1376, None);
        assert_eq!(result, AppendResult::Tripped);
    }
}
