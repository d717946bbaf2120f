//! Minimal interface to the client-side conductor: destination management and connection
//! liveness. The conductor runs the control protocol against the media driver and owns the clock
//! `is_publication_connected` checks against; this crate only ever forwards the timestamp the
//! log's own metadata already carries.

use core::fmt;

/// What a `Publication` needs from the client-side conductor.
///
/// A `Publication` holds its `ConductorLink` behind a `Mutex`, which plays the role of the
/// conductor's client lock: `close`, `add_destination` and `remove_destination` all acquire it
/// before calling through, serializing conductor interactions. A plain, non-reentrant mutex is
/// enough here because none of those three ever call back into one another while holding it.
pub trait ConductorLink: Send {
    /// Whether a subscriber has sent a status message recently enough, per the conductor's own
    /// clock, given the timestamp of the last one this publication's log recorded.
    fn is_publication_connected(&self, time_of_last_status_message: i64) -> bool;

    /// Release this publication's registration. Called at most meaningfully once; a conductor
    /// implementation should treat repeat calls as a no-op, matching `close`'s idempotence.
    fn release_publication(&self, registration_id: i64);

    fn add_destination(&self, registration_id: i64, url: &str) -> Result<(), ConductorError>;

    fn remove_destination(&self, registration_id: i64, url: &str) -> Result<(), ConductorError>;
}

/// A conductor-side failure adding or removing a manual destination.
#[derive(Debug)]
pub struct ConductorError(pub String);

impl fmt::Display for ConductorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conductor rejected the request: {}", self.0)
    }
}

impl std::error::Error for ConductorError {}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use core::sync::atomic::{AtomicBool, Ordering};

    /// A `ConductorLink` for tests: always connected (or not, as configured), destinations always
    /// succeed, release is observable.
    pub struct StubConductor {
        pub connected: AtomicBool,
        pub released: AtomicBool,
    }

    impl StubConductor {
        pub fn new(connected: bool) -> Self {
            StubConductor {
                connected: AtomicBool::new(connected),
                released: AtomicBool::new(false),
            }
        }
    }

    impl ConductorLink for StubConductor {
        fn is_publication_connected(&self, _time_of_last_status_message: i64) -> bool {
            self.connected.load(Ordering::Relaxed)
        }

        fn release_publication(&self, _registration_id: i64) {
            self.released.store(true, Ordering::Relaxed);
        }

        fn add_destination(&self, _registration_id: i64, _url: &str) -> Result<(), ConductorError> {
            Ok(())
        }

        fn remove_destination(&self, _registration_id: i64, _url: &str) -> Result<(), ConductorError> {
            Ok(())
        }
    }
}
