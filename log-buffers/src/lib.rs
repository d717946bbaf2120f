//! Memory-mapped term log: the shared layout a single exclusive publisher and any number of
//! subscribers agree on without any of them holding a lock.
//!
//! A log is a metadata page followed by three equal-length term buffers. This crate owns the
//! `mmap`, derives typed atomic views over both regions at well-known offsets, and gives every
//! caller across the process boundary the same rules for reading them.

mod error;
mod meta;
mod position;
mod raw_tail;
mod term_buffer;

pub use error::LogError;
pub use meta::{log_meta_descriptor, LogMetadata};
pub use position::{AtomicPosition, ReadablePosition};
pub use raw_tail::RawTail;
pub use term_buffer::TermBuffer;

use core::sync::atomic::Ordering;
use memmap2::MmapRaw;
use shm_fd::SharedFd;
use std::os::unix::io::AsRawFd;

/// Number of partitions a log is always divided into.
pub const PARTITION_COUNT: usize = 3;

/// Smallest permitted term length: 64 KiB.
pub const TERM_MIN_LENGTH: u32 = 1 << 16;

/// Largest permitted term length: 1 GiB.
pub const TERM_MAX_LENGTH: u32 = 1 << 30;

/// An opened, memory-mapped term log.
///
/// Owns the mapping; the metadata view and the three term-buffer views all borrow from it for as
/// long as `LogBuffers` is alive. Dropping it unmaps the file, which is why `Publication` and
/// every `BufferClaim` it hands out borrow a `LogBuffers` rather than taking pieces of it apart.
pub struct LogBuffers {
    // Kept only to control drop order: the mapping must outlive `meta` and `terms`, both of which
    // alias into it with an erased, 'static-in-name lifetime (see `map_regions`).
    #[allow(dead_code)]
    mapping: MmapRaw,
    meta: &'static LogMetadata,
    terms: [TermBuffer; PARTITION_COUNT],
}

impl LogBuffers {
    /// Open an already-initialized log, validating its layout.
    ///
    /// This is the path a publication normally takes: the media driver created and sized the
    /// file already, this process only maps it and checks the fields it depends on.
    pub fn open<T: AsRawFd>(fd: T, term_length: u32) -> Result<Self, LogError> {
        let mapping = MmapRaw::map_raw(&fd).map_err(LogError::Mmap)?;
        let mut log = Self::from_mapping(mapping, term_length)?;
        log.validate()?;
        #[cfg(feature = "tracing")]
        tracing::debug!(term_length, "opened existing log");
        Ok(log)
    }

    /// Open a log handed to this process by a conductor via the `SHM_SHARED_FDS` environment
    /// variable, the same shared-memory-descriptor handoff mechanism used elsewhere for passing
    /// anonymous memory between a supervisor and a child it spawned.
    pub fn from_conductor_handoff(term_length: u32) -> Result<Self, LogError> {
        // Safety: we trust the conductor that set up our environment to have handed us a file
        // descriptor it owns no other references to.
        let fd = unsafe { SharedFd::from_env() }.ok_or(LogError::NoHandoff)?;
        Self::open(fd, term_length)
    }

    /// Lay down a fresh log in an already-sized file descriptor.
    ///
    /// Used by test fixtures and by whichever process stands in for the media driver: it zeroes
    /// the metadata page, stamps the layout tag, and seeds partition 0 with `initial_term_id`.
    pub fn initialize<T: AsRawFd>(
        fd: T,
        term_length: u32,
        mtu_length: u32,
        initial_term_id: i32,
    ) -> Result<Self, LogError> {
        let mapping = MmapRaw::map_raw(&fd).map_err(LogError::Mmap)?;
        let log = Self::from_mapping(mapping, term_length)?;

        log.meta.initial_term_id.store(initial_term_id, Ordering::Relaxed);
        log.meta.mtu_length.store(mtu_length as i32, Ordering::Relaxed);
        log.meta.term_length.store(term_length as i32, Ordering::Relaxed);
        log.meta.active_partition_index.store(0, Ordering::Relaxed);
        log.meta
            .time_of_last_status_message
            .store(0, Ordering::Relaxed);

        let default_header = log_meta_descriptor::default_frame_header_template();
        log.meta.store_default_frame_header(&default_header);

        // Partition `i` starts pre-armed for the term it will hold once rotation reaches it, so
        // the very first rotation into partition 1 finds a raw tail already carrying
        // `initial_term_id + 1`, per invariant 4.
        for (index, raw_tail) in log.meta.raw_tail.iter().enumerate() {
            let armed_term_id = initial_term_id.wrapping_add(index as i32);
            raw_tail.store(
                RawTail::pack(armed_term_id, 0).into_raw() as u64,
                Ordering::Relaxed,
            );
        }

        log.meta.layout_tag.store(log_meta_descriptor::LAYOUT_TAG, Ordering::Release);
        #[cfg(feature = "tracing")]
        tracing::debug!(term_length, mtu_length, initial_term_id, "initialized fresh log");
        Ok(log)
    }

    fn from_mapping(mapping: MmapRaw, term_length: u32) -> Result<Self, LogError> {
        if !term_length.is_power_of_two()
            || term_length < TERM_MIN_LENGTH
            || term_length > TERM_MAX_LENGTH
        {
            return Err(LogError::InvalidTermLength(term_length));
        }

        let required = log_meta_descriptor::LOG_META_DATA_LENGTH
            + (term_length as usize) * PARTITION_COUNT;
        if mapping.len() < required {
            return Err(LogError::TooSmall {
                have: mapping.len(),
                need: required,
            });
        }

        let base = mapping.as_mut_ptr();

        // Safety: `base` is valid for `mapping.len()` bytes for as long as `mapping` is alive,
        // which is exactly the lifetime of the `LogBuffers` that now owns it. The erased 'static
        // lifetime never escapes this struct's public API.
        let meta: &'static LogMetadata = unsafe { &*(base as *const LogMetadata) };

        let terms = core::array::from_fn(|index| {
            let offset = log_meta_descriptor::LOG_META_DATA_LENGTH + index * term_length as usize;
            // Safety: `offset + term_length` stays within the validated mapping length above.
            unsafe { TermBuffer::new(base.add(offset), term_length as usize) }
        });

        Ok(LogBuffers {
            mapping,
            meta,
            terms,
        })
    }

    fn validate(&mut self) -> Result<(), LogError> {
        if self.meta.layout_tag.load(Ordering::Acquire) != log_meta_descriptor::LAYOUT_TAG {
            return Err(LogError::UnrecognizedLayout);
        }

        let mtu = self.meta.mtu_length.load(Ordering::Relaxed);
        if mtu <= 0 || mtu as u32 > self.term_length() {
            return Err(LogError::InvalidMtu(mtu));
        }

        Ok(())
    }

    /// The metadata region shared by writer and readers.
    pub fn meta_data(&self) -> &LogMetadata {
        self.meta
    }

    /// The three term buffers, in partition order.
    pub fn term_buffers(&self) -> &[TermBuffer; PARTITION_COUNT] {
        &self.terms
    }

    /// Length, in bytes, of a single term buffer.
    pub fn term_length(&self) -> u32 {
        self.meta.term_length.load(Ordering::Relaxed) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memfile::CreateOptions;

    fn anonymous_file(len: u64) -> memfile::MemFile {
        let file = CreateOptions::new()
            .create(env!("CARGO_PKG_NAME"))
            .expect("create anonymous memfile");
        file.set_len(len).unwrap();
        file
    }

    #[test]
    fn initialize_then_open_round_trips_layout() {
        let term_length = TERM_MIN_LENGTH;
        let total = log_meta_descriptor::LOG_META_DATA_LENGTH as u64
            + term_length as u64 * PARTITION_COUNT as u64;
        let file = anonymous_file(total);

        {
            let log = LogBuffers::initialize(&file, term_length, 1408, -1234).unwrap();
            assert_eq!(log.term_length(), term_length);
        }

        let reopened = LogBuffers::open(&file, term_length).unwrap();
        assert_eq!(
            reopened.meta_data().initial_term_id.load(Ordering::Relaxed),
            -1234
        );
        assert_eq!(reopened.meta_data().mtu_length.load(Ordering::Relaxed), 1408);
    }

    #[test]
    fn open_rejects_non_power_of_two_term_length() {
        let file = anonymous_file(1 << 20);
        let err = LogBuffers::open(&file, 3 * TERM_MIN_LENGTH).unwrap_err();
        assert!(matches!(err, LogError::InvalidTermLength(_)));
    }

    #[test]
    fn open_rejects_unrecognized_layout() {
        let term_length = TERM_MIN_LENGTH;
        let total = log_meta_descriptor::LOG_META_DATA_LENGTH as u64
            + term_length as u64 * PARTITION_COUNT as u64;
        let file = anonymous_file(total);

        let err = LogBuffers::open(&file, term_length).unwrap_err();
        assert!(matches!(err, LogError::UnrecognizedLayout));
    }
}
