//! Stamps the log's default frame header template into reserved space.

use crate::frame;

/// Writes the per-frame header template a [`log_buffers::LogMetadata`] carries, patching the
/// fields that change from frame to frame.
///
/// The template supplies `version`, `session_id`, `stream_id` (baked in once, at log creation)
/// and a default `flags`/`type` that callers override per frame (BEGIN/END, padding). `write`
/// itself only ever patches `frame_length` (to the negative sentinel), `term_offset` and
/// `term_id` — exactly the fields `TermAppender` cannot know ahead of the reservation.
pub struct HeaderWriter {
    template: [u8; frame::HEADER_LENGTH],
}

impl HeaderWriter {
    pub fn new(template: [u8; frame::HEADER_LENGTH]) -> Self {
        HeaderWriter { template }
    }

    /// Stamp the template into `dst`, then patch in the sentinel length, offset and term id.
    ///
    /// `dst` must be at least `HEADER_LENGTH` bytes; `aligned_frame_length` is the full reserved
    /// length (header included) so the sentinel published here is exactly `-aligned_frame_length`,
    /// matching the positive value the appender publishes once the frame is complete.
    pub fn write(&self, dst: &mut [u8], frame_offset: u32, aligned_frame_length: u32, term_id: i32) {
        dst[..frame::HEADER_LENGTH].copy_from_slice(&self.template);
        frame::set_sentinel_length(dst, aligned_frame_length);
        frame::set_term_offset(dst, frame_offset);
        frame::set_term_id(dst, term_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_patches_offset_term_id_and_sentinel_length_only() {
        let mut template = [0u8; frame::HEADER_LENGTH];
        frame::set_flags(&mut template, 0xAA);
        template[frame::HEADER_LENGTH - 1] = 0x11; // inside reserved_value, part of template

        let writer = HeaderWriter::new(template);
        let mut dst = [0xFFu8; frame::HEADER_LENGTH];
        writer.write(&mut dst, 4096, 128, 7);

        assert_eq!(frame::frame_length_field(&dst), -128);
        assert_eq!(frame::term_offset_field(&dst), 4096);
        assert_eq!(frame::term_id_field(&dst), 7);
        assert_eq!(frame::flags(&dst), 0xAA);
        assert_eq!(dst[frame::HEADER_LENGTH - 1], 0x11);
    }
}
