use core::fmt;

/// Failures that can occur while opening or initializing a [`crate::LogBuffers`].
///
/// A small enum implementing `std::error::Error` directly rather than pulling in a derive-macro
/// crate for the one error type this module needs.
#[derive(Debug)]
pub enum LogError {
    /// The backing file could not be mapped into memory.
    Mmap(std::io::Error),
    /// No `SHM_SHARED_FDS` handoff was present in the environment.
    NoHandoff,
    /// `term_length` was not a power of two in `[TERM_MIN_LENGTH, TERM_MAX_LENGTH]`.
    InvalidTermLength(u32),
    /// The mapped file is smaller than the metadata region plus three term buffers require.
    TooSmall { have: usize, need: usize },
    /// The metadata page's layout tag does not match this crate's, so the file is either
    /// uninitialized or was laid out by an incompatible version.
    UnrecognizedLayout,
    /// `mtu_length` read from metadata is non-positive or larger than the term length.
    InvalidMtu(i32),
    /// A raw tail was observed carrying a term id that cannot follow from the log's recorded
    /// history — the log was corrupted by something other than this crate's single writer.
    Corrupt,
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::Mmap(err) => write!(f, "failed to map log file: {err}"),
            LogError::NoHandoff => write!(f, "no shared log file descriptor in environment"),
            LogError::InvalidTermLength(n) => {
                write!(f, "term length {n} is not a power of two in the allowed range")
            }
            LogError::TooSmall { have, need } => {
                write!(f, "log file too small: have {have} bytes, need {need}")
            }
            LogError::UnrecognizedLayout => write!(f, "log file has an unrecognized layout tag"),
            LogError::InvalidMtu(mtu) => write!(f, "invalid mtu_length {mtu} in log metadata"),
            LogError::Corrupt => write!(f, "log metadata is inconsistent with its own history"),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LogError::Mmap(err) => Some(err),
            _ => None,
        }
    }
}
