use core::sync::atomic::{AtomicI32, AtomicI64, AtomicU64};

/// Offsets and constants of the metadata region, one page at the start of the log.
///
/// Plain constants next to the accessors that use them, rather than a config struct that has to
/// be threaded everywhere.
pub mod log_meta_descriptor {
    /// Total size of the metadata region: one page.
    pub const LOG_META_DATA_LENGTH: usize = 4096;

    /// Magic value stamped into `layout_tag` once a log has been fully initialized. Distinguishes
    /// a freshly zeroed (or foreign) file from one this crate laid out.
    pub const LAYOUT_TAG: u64 = 0xae70_6c6f_6731_0001;

    /// Length, in bytes, of the default frame header template.
    pub const DEFAULT_FRAME_HEADER_LENGTH: usize = 32;

    /// The header template stamped into a freshly initialized log: version 0, type 0, everything
    /// else zero. `HeaderWriter` patches the per-frame fields over this on every write.
    pub fn default_frame_header_template() -> [u8; DEFAULT_FRAME_HEADER_LENGTH] {
        [0u8; DEFAULT_FRAME_HEADER_LENGTH]
    }
}

/// Typed view over the metadata region shared by the publisher and every subscriber.
///
/// This struct's layout must exactly match `log_meta_descriptor::LOG_META_DATA_LENGTH` bytes at
/// the offsets its fields imply; it is only ever reached through a raw pointer cast in
/// `LogBuffers::from_mapping`, never constructed by value.
#[repr(C)]
pub struct LogMetadata {
    /// Packed `(term_id, tail_offset)` per partition, in partition order.
    pub raw_tail: [AtomicU64; crate::PARTITION_COUNT],
    /// Index of the currently active partition.
    pub active_partition_index: AtomicI32,
    /// Term id the log started at.
    pub initial_term_id: AtomicI32,
    /// Maximum transmission unit; caps single-frame payload size.
    pub mtu_length: AtomicI32,
    /// Length, in bytes, of a single term buffer.
    pub term_length: AtomicI32,
    /// Timestamp of the most recent status message the conductor observed from a subscriber.
    pub time_of_last_status_message: AtomicI64,
    /// Magic tag validated by `LogBuffers::open`.
    pub layout_tag: AtomicU64,
    _reserved: [u8; log_meta_descriptor::LOG_META_DATA_LENGTH
        - 3 * 8 /* raw_tail */
        - 4 * 4 /* active_partition_index, initial_term_id, mtu_length, term_length */
        - 8 /* time_of_last_status_message */
        - 8 /* layout_tag */
        - log_meta_descriptor::DEFAULT_FRAME_HEADER_LENGTH],
    /// Template frame header `HeaderWriter` stamps per-frame fields over.
    pub default_frame_header: [u8; log_meta_descriptor::DEFAULT_FRAME_HEADER_LENGTH],
}

impl LogMetadata {
    /// Overwrite the default frame header template.
    pub fn store_default_frame_header(&self, template: &[u8; log_meta_descriptor::DEFAULT_FRAME_HEADER_LENGTH]) {
        // Safety: exclusive access is guaranteed by construction discipline (only
        // `LogBuffers::initialize` calls this, before publishing `layout_tag`).
        let dst = self.default_frame_header.as_ptr() as *mut u8;
        unsafe { core::ptr::copy_nonoverlapping(template.as_ptr(), dst, template.len()) };
    }
}

const _: () = assert!(
    core::mem::size_of::<LogMetadata>() == log_meta_descriptor::LOG_META_DATA_LENGTH,
    "LogMetadata must exactly fill one metadata page"
);
