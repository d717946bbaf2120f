//! Error taxonomy for the append path: transient back-pressure, terminal closure, and
//! programmer-error input violations, each a typed variant rather than a stringly-typed failure.

use core::fmt;

use crate::conductor::ConductorError;

/// Wire-compatible numeric encodings of the transient/terminal `offer`/`try_claim` outcomes.
///
/// Kept available for diagnostics or cross-language comparison even though the Rust API itself
/// returns a typed `Err` instead of a raw negative position.
pub mod sentinel {
    pub const NOT_CONNECTED: i64 = -1;
    pub const BACK_PRESSURED: i64 = -2;
    pub const ADMIN_ACTION: i64 = -3;
    pub const CLOSED: i64 = -4;
}

/// Transient or terminal failure of `offer`/`try_claim`'s back-pressure and lifecycle checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferError {
    /// Back-pressured and no subscriber has been heard from recently: nothing is listening.
    NotConnected,
    /// Back-pressured, but a subscriber is connected and should catch up; retry later.
    BackPressured,
    /// A term rotation just happened (possibly triggered by this very call tripping); retry
    /// immediately.
    AdminAction,
    /// The publication is closed; this and every future call will return the same error.
    Closed,
}

impl OfferError {
    /// The numeric sentinel this outcome corresponds to on the wire.
    pub const fn as_sentinel(self) -> i64 {
        match self {
            OfferError::NotConnected => sentinel::NOT_CONNECTED,
            OfferError::BackPressured => sentinel::BACK_PRESSURED,
            OfferError::AdminAction => sentinel::ADMIN_ACTION,
            OfferError::Closed => sentinel::CLOSED,
        }
    }
}

impl fmt::Display for OfferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferError::NotConnected => write!(f, "publication is not connected to any subscriber"),
            OfferError::BackPressured => write!(f, "publication is back-pressured by its position limit"),
            OfferError::AdminAction => write!(f, "term rotated; retry the offer"),
            OfferError::Closed => write!(f, "publication is closed"),
        }
    }
}

impl std::error::Error for OfferError {}

/// Umbrella error covering everything `offer`, `try_claim`, `close`, `add_destination` and
/// `remove_destination` can fail with: the transient/terminal `OfferError`s, input violations
/// (programmer errors reported as `Err` rather than a panic, so an embedding application decides
/// how to surface them), and conductor-side failures.
#[derive(Debug)]
pub enum PublicationError {
    /// `offer`'s message exceeded `max_message_length`. The publication's state is unchanged.
    MessageTooLong { length: usize, max_message_length: u32 },
    /// `try_claim`'s length exceeded `max_payload_length` (claims are single-MTU only). The
    /// publication's state is unchanged.
    ClaimTooLong { length: usize, max_payload_length: u32 },
    /// One of the transient/terminal outcomes common to `offer` and `try_claim`.
    Offer(OfferError),
    /// The conductor rejected a destination change.
    Conductor(ConductorError),
}

impl From<OfferError> for PublicationError {
    fn from(err: OfferError) -> Self {
        PublicationError::Offer(err)
    }
}

impl fmt::Display for PublicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicationError::MessageTooLong { length, max_message_length } => write!(
                f,
                "message of {length} bytes exceeds max_message_length {max_message_length}"
            ),
            PublicationError::ClaimTooLong { length, max_payload_length } => write!(
                f,
                "claim of {length} bytes exceeds max_payload_length {max_payload_length}"
            ),
            PublicationError::Offer(err) => fmt::Display::fmt(err, f),
            PublicationError::Conductor(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for PublicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PublicationError::Offer(err) => Some(err),
            PublicationError::Conductor(err) => Some(err),
            _ => None,
        }
    }
}
