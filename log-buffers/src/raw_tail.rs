/// Packed `(term_id, tail_offset)` describing the next byte to reserve in a partition.
///
/// `term_id` occupies the high 32 bits, `tail_offset` the low 32 bits, so ordering comparisons on
/// the raw `i64` agree with ordering on `(term_id, tail_offset)` lexicographically, letting a
/// single compare-and-swap advance both counters as one atomic word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawTail(i64);

impl RawTail {
    /// Pack a term id and tail offset into one word.
    pub fn pack(term_id: i32, tail_offset: u32) -> Self {
        RawTail(((term_id as i64) << 32) | (tail_offset as i64 & 0xFFFF_FFFF))
    }

    /// Unpack a raw `i64` read from shared memory.
    pub fn unpack(raw: i64) -> Self {
        RawTail(raw)
    }

    /// The raw `i64` representation to store back into shared memory.
    pub fn into_raw(self) -> i64 {
        self.0
    }

    /// The term id component.
    pub fn term_id(self) -> i32 {
        (self.0 >> 32) as i32
    }

    /// The tail offset component.
    ///
    /// Note this can legitimately exceed the term length: the reservation algorithm allows the
    /// tail to be bumped past the end of the term by the amount reserved for a trailing padding
    /// frame, before the writer notices and rotates.
    pub fn tail_offset(self) -> u32 {
        self.0 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let packed = RawTail::pack(-1234, 0xABCD);
        let raw = packed.into_raw();
        let unpacked = RawTail::unpack(raw);
        assert_eq!(unpacked.term_id(), -1234);
        assert_eq!(unpacked.tail_offset(), 0xABCD);
    }

    #[test]
    fn ordering_matches_lexicographic_term_then_offset() {
        let a = RawTail::pack(5, u32::MAX);
        let b = RawTail::pack(6, 0);
        assert!(a.into_raw() < b.into_raw());
    }
}
