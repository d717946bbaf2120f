//! Orchestrates partition selection, back-pressure, rotation, fragmentation policy and lifecycle
//! for a single exclusive, single-writer publication over one shared-memory log.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use log_buffers::{LogBuffers, LogError, RawTail, ReadablePosition, PARTITION_COUNT};

use crate::buffer_claim::BufferClaim;
use crate::conductor::ConductorLink;
use crate::error::{OfferError, PublicationError};
use crate::frame;
use crate::header::HeaderWriter;
use crate::term_appender::{AppendResult, ClaimOutcome, ReservedValueSupplier, TermAppender};

/// A single exclusive publication over a shared-memory term log.
///
/// Constructed from a conductor handoff (an already-opened `LogBuffers` plus a consumer position
/// handle); mutated only by its owning writer through `offer`/`try_claim`/`close`, which is a
/// contract this type documents rather than enforces with the borrow checker. `offer` and
/// `try_claim` take `&self`, not `&mut self`, so that `position`/`position_limit` stay callable
/// concurrently from any thread without needing an `unsafe impl Sync`; every field they touch is
/// either atomic or behind its own lock.
pub struct Publication<C, P> {
    log: LogBuffers,
    header: HeaderWriter,
    conductor: Mutex<C>,
    position_limit: P,
    registration_id: i64,

    initial_term_id: i32,
    position_bits_to_shift: u32,
    max_payload_length: u32,
    max_message_length: u32,

    active_partition_index: AtomicUsize,
    term_id: AtomicI32,
    term_offset: AtomicI64,
    term_begin_position: AtomicI64,
    is_closed: AtomicBool,
}

impl<C, P> Publication<C, P>
where
    C: ConductorLink,
    P: ReadablePosition,
{
    /// Build a publication over an already-opened log, deriving writer state from the active
    /// partition's raw tail.
    pub fn new(
        log: LogBuffers,
        conductor: C,
        position_limit: P,
        registration_id: i64,
    ) -> Result<Self, LogError> {
        let term_length = log.term_length();
        let meta = log.meta_data();

        let mtu_length = meta.mtu_length.load(Ordering::Relaxed);
        if mtu_length <= 0 {
            return Err(LogError::InvalidMtu(mtu_length));
        }
        let mtu_length = mtu_length as u32;
        let initial_term_id = meta.initial_term_id.load(Ordering::Relaxed);
        let position_bits_to_shift = term_length.trailing_zeros();
        let max_payload_length = mtu_length - frame::HEADER_LENGTH as u32;
        let max_message_length = (term_length / 8).min(16 * 1024 * 1024);

        let active_partition_index = meta.active_partition_index.load(Ordering::Acquire) as usize;
        let raw_tail = RawTail::unpack(
            meta.raw_tail[active_partition_index].load(Ordering::Acquire) as i64,
        );
        if raw_tail.term_id().wrapping_sub(initial_term_id) < 0 {
            return Err(LogError::Corrupt);
        }

        let term_id = raw_tail.term_id();
        let term_offset = raw_tail.tail_offset().min(term_length) as i64;
        let term_begin_position =
            ((term_id.wrapping_sub(initial_term_id)) as i64) << position_bits_to_shift;

        let mut template = [0u8; frame::HEADER_LENGTH];
        template.copy_from_slice(&meta.default_frame_header);

        Ok(Publication {
            log,
            header: HeaderWriter::new(template),
            conductor: Mutex::new(conductor),
            position_limit,
            registration_id,
            initial_term_id,
            position_bits_to_shift,
            max_payload_length,
            max_message_length,
            active_partition_index: AtomicUsize::new(active_partition_index),
            term_id: AtomicI32::new(term_id),
            term_offset: AtomicI64::new(term_offset),
            term_begin_position: AtomicI64::new(term_begin_position),
            is_closed: AtomicBool::new(false),
        })
    }

    /// Maximum payload a single, unfragmented frame (or a `try_claim`) can carry.
    pub fn max_payload_length(&self) -> u32 {
        self.max_payload_length
    }

    /// Maximum total message length `offer` accepts before fragmenting.
    pub fn max_message_length(&self) -> u32 {
        self.max_message_length
    }

    fn appender(&self, partition_index: usize) -> TermAppender<'_> {
        TermAppender::new(
            &self.log.term_buffers()[partition_index],
            &self.log.meta_data().raw_tail[partition_index],
            partition_index,
        )
    }

    fn time_of_last_status_message(&self) -> i64 {
        self.log
            .meta_data()
            .time_of_last_status_message
            .load(Ordering::Relaxed)
    }

    fn is_connected_unchecked(&self) -> bool {
        let last_status = self.time_of_last_status_message();
        self.conductor
            .lock()
            .expect("conductor client lock poisoned")
            .is_publication_connected(last_status)
    }

    /// Not closed, and the conductor reports a subscriber has been heard from recently.
    pub fn is_connected(&self) -> bool {
        !self.is_closed.load(Ordering::Acquire) && self.is_connected_unchecked()
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    fn check_back_pressure(&self) -> Result<(), OfferError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(OfferError::Closed);
        }
        let limit = self.position_limit.get_volatile();
        let position =
            self.term_begin_position.load(Ordering::Relaxed) + self.term_offset.load(Ordering::Relaxed);
        if position >= limit {
            return Err(if self.is_connected_unchecked() {
                OfferError::BackPressured
            } else {
                OfferError::NotConnected
            });
        }
        Ok(())
    }

    /// The writer's current stream position, read from the active partition's raw tail with
    /// acquire ordering.
    ///
    /// This reads shared metadata, not this writer's locally cached `term_offset`, so it may
    /// disagree by one rotation's worth of bytes with the position `offer` just returned. Treat
    /// it as a hint, not as synchronized writer state.
    pub fn position(&self) -> Result<i64, PublicationError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(PublicationError::Offer(OfferError::Closed));
        }
        let meta = self.log.meta_data();
        let active = meta.active_partition_index.load(Ordering::Acquire) as usize;
        let raw = RawTail::unpack(meta.raw_tail[active].load(Ordering::Acquire) as i64);
        Ok(self.position_of(raw))
    }

    fn position_of(&self, raw: RawTail) -> i64 {
        let term_count = raw.term_id().wrapping_sub(self.initial_term_id) as i64;
        (term_count << self.position_bits_to_shift) + raw.tail_offset() as i64
    }

    /// The consumer-advertised position limit, read with acquire ordering.
    pub fn position_limit(&self) -> Result<i64, PublicationError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(PublicationError::Offer(OfferError::Closed));
        }
        Ok(self.position_limit.get_volatile())
    }

    fn term_begin_position_for(&self, term_id: i32) -> i64 {
        ((term_id.wrapping_sub(self.initial_term_id)) as i64) << self.position_bits_to_shift
    }

    /// Roll from `previous_partition_index` to the next partition, arming its raw tail and
    /// publishing the new active index to metadata with release ordering.
    fn rotate_term(&self, previous_partition_index: usize) {
        let next_partition_index = (previous_partition_index + 1) % PARTITION_COUNT;
        let next_term_id = self.term_id.load(Ordering::Relaxed).wrapping_add(1);

        self.term_offset.store(0, Ordering::Relaxed);
        self.term_id.store(next_term_id, Ordering::Relaxed);
        self.term_begin_position
            .store(self.term_begin_position_for(next_term_id), Ordering::Relaxed);

        self.appender(next_partition_index).tail_term_id(next_term_id);
        self.active_partition_index
            .store(next_partition_index, Ordering::Relaxed);
        self.log
            .meta_data()
            .active_partition_index
            .store(next_partition_index as i32, Ordering::Release);

        crate::trace_event!(
            "term rotated";
            previous_partition_index = previous_partition_index,
            next_partition_index = next_partition_index,
            next_term_id = next_term_id
        );
    }

    fn new_position(&self, partition_index: usize, result: AppendResult) -> Result<i64, PublicationError> {
        match result {
            AppendResult::Advanced(new_offset) => {
                self.term_offset.store(new_offset as i64, Ordering::Relaxed);
                Ok(self.term_begin_position.load(Ordering::Relaxed) + new_offset as i64)
            }
            AppendResult::Tripped => {
                self.rotate_term(partition_index);
                Err(PublicationError::Offer(OfferError::AdminAction))
            }
        }
    }

    /// Append `buf` as a message, fragmenting if it exceeds `max_payload_length`.
    ///
    /// On `TRIPPED` (the active partition could not fit the message), the partition is rotated
    /// and `Err(PublicationError::Offer(OfferError::AdminAction))` is returned; per the source
    /// system's contract, the caller retries by calling `offer` again rather than this crate
    /// looping internally.
    pub fn offer(&self, buf: &[u8]) -> Result<i64, PublicationError> {
        self.offer_with(buf, None)
    }

    /// As [`Self::offer`], with a callback computing the frame's `reserved_value` after the
    /// payload has been copied.
    pub fn offer_with(
        &self,
        buf: &[u8],
        reserved_value_supplier: ReservedValueSupplier<'_>,
    ) -> Result<i64, PublicationError> {
        self.check_back_pressure()?;

        let term_id = self.term_id.load(Ordering::Relaxed);
        let partition_index = self.active_partition_index.load(Ordering::Relaxed);
        let appender = self.appender(partition_index);

        let result = if buf.len() as u64 <= self.max_payload_length as u64 {
            appender.append_unfragmented_message(term_id, &self.header, buf, reserved_value_supplier)
        } else {
            if buf.len() as u64 > self.max_message_length as u64 {
                return Err(PublicationError::MessageTooLong {
                    length: buf.len(),
                    max_message_length: self.max_message_length,
                });
            }
            appender.append_fragmented_message(
                term_id,
                &self.header,
                buf,
                self.max_payload_length,
                reserved_value_supplier,
            )
        };

        self.new_position(partition_index, result)
    }

    /// Reserve a single frame's worth of space without copying, returning both the resulting
    /// stream position and a [`BufferClaim`] the caller writes through and then commits or
    /// aborts.
    ///
    /// Rejects `length > max_payload_length`: claims are always single-MTU, never fragmented.
    pub fn try_claim(&self, length: u32) -> Result<(i64, BufferClaim<'_>), PublicationError> {
        if length > self.max_payload_length {
            return Err(PublicationError::ClaimTooLong {
                length: length as usize,
                max_payload_length: self.max_payload_length,
            });
        }
        self.check_back_pressure()?;

        let term_id = self.term_id.load(Ordering::Relaxed);
        let partition_index = self.active_partition_index.load(Ordering::Relaxed);
        let appender = self.appender(partition_index);

        match appender.claim(term_id, &self.header, length) {
            ClaimOutcome::Reserved { resulting_offset, claim } => {
                let position = self.new_position(partition_index, AppendResult::Advanced(resulting_offset))?;
                Ok((position, claim))
            }
            ClaimOutcome::Tripped => {
                self.rotate_term(partition_index);
                Err(PublicationError::Offer(OfferError::AdminAction))
            }
        }
    }

    /// Ask the conductor to add a manual destination (MDC/multi-destination publications).
    pub fn add_destination(&self, url: &str) -> Result<(), PublicationError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(PublicationError::Offer(OfferError::Closed));
        }
        self.conductor
            .lock()
            .expect("conductor client lock poisoned")
            .add_destination(self.registration_id, url)
            .map_err(PublicationError::Conductor)
    }

    pub fn remove_destination(&self, url: &str) -> Result<(), PublicationError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(PublicationError::Offer(OfferError::Closed));
        }
        self.conductor
            .lock()
            .expect("conductor client lock poisoned")
            .remove_destination(self.registration_id, url)
            .map_err(PublicationError::Conductor)
    }

    /// Idempotent: the first call releases the publication through the conductor; every
    /// subsequent call (and every subsequent `offer`/`try_claim`/`position`/`position_limit`) is a
    /// no-op / returns `Closed`.
    pub fn close(&self) {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        crate::trace_event!("publication closed"; registration_id = self.registration_id);
        self.conductor
            .lock()
            .expect("conductor client lock poisoned")
            .release_publication(self.registration_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::test_support::StubConductor;
    use log_buffers::AtomicPosition;
    use memfile::CreateOptions;

    const TERM_MIN_LENGTH: u32 = 1 << 16;

    fn anonymous_log(term_length: u32, mtu: u32, initial_term_id: i32) -> LogBuffers {
        let file = CreateOptions::new()
            .create("exclusive-publication-test")
            .expect("create anonymous memfile");
        let total = 4096u64 + term_length as u64 * PARTITION_COUNT as u64;
        file.set_len(total).unwrap();
        LogBuffers::initialize(&file, term_length, mtu, initial_term_id).unwrap()
    }

    fn publication(
        term_length: u32,
        mtu: u32,
        limit: i64,
    ) -> Publication<StubConductor, AtomicPosition> {
        let log = anonymous_log(term_length, mtu, 0);
        let conductor = StubConductor::new(true);
        let position_limit = AtomicPosition::new(limit);
        Publication::new(log, conductor, position_limit, 1).unwrap()
    }

    #[test]
    fn offer_small_message_returns_aligned_position() {
        let publication = publication(TERM_MIN_LENGTH, 4096, i64::MAX);
        let position = publication.offer(&[0u8; 100]).unwrap();
        assert_eq!(position, frame::aligned_length(100) as i64);
    }

    #[test]
    fn offer_fills_term_then_trips_and_rotates() {
        let publication = publication(TERM_MIN_LENGTH, 4096, i64::MAX);
        let payload = vec![0u8; 4064];
        let mut last = 0;
        for _ in 0..16 {
            last = publication.offer(&payload).unwrap();
        }
        assert_eq!(last, 65536);

        let err = publication.offer(&payload).unwrap_err();
        assert!(matches!(err, PublicationError::Offer(OfferError::AdminAction)));

        let retried = publication.offer(&payload).unwrap();
        assert_eq!(retried, 65536 + frame::aligned_length(4064) as i64);
    }

    #[test]
    fn offer_back_pressured_when_position_reaches_limit() {
        let publication = publication(TERM_MIN_LENGTH, 4096, 1024);
        loop {
            match publication.offer(&[0u8; 900]) {
                Ok(_) => continue,
                Err(PublicationError::Offer(OfferError::BackPressured)) => break,
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn offer_not_connected_when_no_recent_status_and_back_pressured() {
        let log = anonymous_log(TERM_MIN_LENGTH, 4096, 0);
        let conductor = StubConductor::new(false);
        let position_limit = AtomicPosition::new(0);
        let publication = Publication::new(log, conductor, position_limit, 1).unwrap();

        let err = publication.offer(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, PublicationError::Offer(OfferError::NotConnected)));
    }

    #[test]
    fn try_claim_rejects_length_over_max_payload() {
        let publication = publication(TERM_MIN_LENGTH, 1408, i64::MAX);
        let err = publication.try_claim(2000).unwrap_err();
        assert!(matches!(err, PublicationError::ClaimTooLong { .. }));
    }

    #[test]
    fn try_claim_commit_publishes_frame() {
        let publication = publication(TERM_MIN_LENGTH, 4096, i64::MAX);
        let (position, mut claim) = publication.try_claim(10).unwrap();
        claim.data().copy_from_slice(b"0123456789");
        claim.commit();
        assert_eq!(position, frame::aligned_length(10) as i64);
    }

    #[test]
    fn close_is_idempotent_and_poisons_further_calls() {
        let publication = publication(TERM_MIN_LENGTH, 4096, i64::MAX);
        publication.close();
        publication.close();

        assert!(matches!(
            publication.offer(&[0u8; 10]),
            Err(PublicationError::Offer(OfferError::Closed))
        ));
        assert!(matches!(
            publication.try_claim(10),
            Err(PublicationError::ClaimTooLong { .. }) | Err(PublicationError::Offer(OfferError::Closed))
        ));
        assert!(matches!(
            publication.position(),
            Err(PublicationError::Offer(OfferError::Closed))
        ));
        assert!(matches!(
            publication.position_limit(),
            Err(PublicationError::Offer(OfferError::Closed))
        ));
    }

    #[test]
    fn message_exceeding_max_message_length_is_rejected_unchanged() {
        let publication = publication(TERM_MIN_LENGTH, 4096, i64::MAX);
        let too_long = vec![0u8; publication.max_message_length() as usize + 1];
        let before = publication.position().unwrap();
        let err = publication.offer(&too_long).unwrap_err();
        assert!(matches!(err, PublicationError::MessageTooLong { .. }));
        assert_eq!(publication.position().unwrap(), before);
    }

    #[test]
    fn fragmented_offer_round_trips_payload() {
        let publication = publication(TERM_MIN_LENGTH, 1408, i64::MAX);
        let message: Vec<u8> = (0..4000u32).map(|i| i as u8).collect();
        let position = publication.offer(&message).unwrap();
        assert!(position > 0);
    }
}
