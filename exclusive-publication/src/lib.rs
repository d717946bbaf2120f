//! The exclusive publication path: the single-writer engine that claims space in the active term
//! of a shared-memory log, writes framed message data (fragmenting when necessary), rotates terms,
//! and applies back-pressure against a consumer position limit.
//!
//! Built on top of [`log_buffers`], which owns the memory-mapped log and its typed, ordering-aware
//! accessors. This crate adds everything above that: frame layout (`frame`), header stamping
//! (`header`), the single-writer append algorithm (`term_appender`), zero-copy claims
//! (`buffer_claim`), the orchestrating `Publication`, and the `ConductorLink` it talks to for
//! lifecycle events.

mod buffer_claim;
mod conductor;
mod error;
mod frame;
mod header;
mod publication;
mod term_appender;

pub use buffer_claim::BufferClaim;
pub use conductor::{ConductorError, ConductorLink};
pub use error::{sentinel, OfferError, PublicationError};
pub use frame::{aligned_length, is_padding, BEGIN_FLAG, END_FLAG, FRAME_ALIGNMENT, HEADER_LENGTH, TYPE_PAD};
pub use header::HeaderWriter;
pub use publication::Publication;
pub use term_appender::{AppendResult, ClaimOutcome, ReservedValueSupplier, TermAppender};

/// Emits a `tracing::trace!` event when the `tracing` feature is enabled; compiles to nothing on
/// the hot append path otherwise, per the ambient diagnostics design ("gated behind a feature so
/// the hot append path pays nothing when unused").
#[doc(hidden)]
#[macro_export]
macro_rules! trace_event {
    ($msg:literal $(; $($field:ident = $value:expr),+ $(,)?)?) => {
        #[cfg(feature = "tracing")]
        {
            tracing::trace!($($($field = $value,)+)? $msg);
        }
        #[cfg(not(feature = "tracing"))]
        {
            $(let _ = ($(&$value,)+);)?
        }
    };
}
