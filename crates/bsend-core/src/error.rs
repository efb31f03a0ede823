//! Error taxonomy for the buffered-send arena.
//!
//! Hand-rolled, matching this lineage's convention of one `Display`-backed
//! enum per crate rather than reaching for an error-derive crate.

use std::fmt;

/// Errors the buffered-send arena can raise at its public boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `attach` was called with a region smaller than
    /// [`crate::block::MIN_BUFFER_OVERHEAD`].
    BufferTooSmall {
        /// Bytes the caller offered.
        size: usize,
        /// Minimum bytes required.
        required: usize,
    },

    /// `attach` was called on a slot that already holds an arena.
    BufferAlreadyAttached,

    /// `send` was called but none of the communicator, session, or process
    /// slots hold an arena.
    NoBufferAttached,

    /// `send` found no fit after two reclaim-then-find passes.
    NoBufferSpace {
        /// Bytes the send needed to carve.
        requested: usize,
        /// The arena's usable capacity, for diagnosis.
        capacity: usize,
    },

    /// The packing facility reported a failure. Surfaced verbatim.
    PackFailed(String),

    /// The send engine refused to initiate the send. Surfaced verbatim.
    SendInitFailed(String),

    /// The progress engine reported a failure during reclaim or drain.
    /// Surfaced verbatim.
    ProgressFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BufferTooSmall { size, required } => write!(
                f,
                "buffer too small: {size} bytes offered, at least {required} required"
            ),
            Error::BufferAlreadyAttached => {
                write!(f, "a buffer is already attached to this slot")
            }
            Error::NoBufferAttached => {
                write!(f, "no buffer attached to communicator, session, or process")
            }
            Error::NoBufferSpace {
                requested,
                capacity,
            } => write!(
                f,
                "no buffer space: requested {requested} bytes, arena capacity is {capacity} bytes"
            ),
            Error::PackFailed(reason) => write!(f, "pack failed: {reason}"),
            Error::SendInitFailed(reason) => write!(f, "send initiation failed: {reason}"),
            Error::ProgressFailed(reason) => write!(f, "progress failed: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias for buffered-send arena operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            Error::BufferTooSmall {
                size: 10,
                required: 72
            }
            .to_string(),
            "buffer too small: 10 bytes offered, at least 72 required"
        );
        assert_eq!(
            Error::BufferAlreadyAttached.to_string(),
            "a buffer is already attached to this slot"
        );
        assert_eq!(
            Error::NoBufferAttached.to_string(),
            "no buffer attached to communicator, session, or process"
        );
        assert_eq!(
            Error::NoBufferSpace {
                requested: 500,
                capacity: 1024
            }
            .to_string(),
            "no buffer space: requested 500 bytes, arena capacity is 1024 bytes"
        );
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(Error::BufferAlreadyAttached, Error::BufferAlreadyAttached);
        assert_ne!(
            Error::NoBufferSpace {
                requested: 1,
                capacity: 2
            },
            Error::NoBufferSpace {
                requested: 1,
                capacity: 3
            }
        );
    }
}
