//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while appending to an arena buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The buffer cannot hold the requested bytes. Recoverable for a
    /// writer batching items (flush and retry); fatal elsewhere.
    BufferFull {
        /// Number of bytes requested.
        requested: usize,
        /// Current buffer capacity in bytes.
        capacity: usize,
    },
    /// A user or role string exceeds the 16-bit length field in the
    /// record header.
    StringTooLong {
        /// Length of the offending string in bytes, terminator included.
        length: usize,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferFull {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "buffer full: requested {requested} bytes, capacity {capacity} bytes"
                )
            }
            Self::StringTooLong { length } => {
                write!(f, "string of {length} bytes exceeds the 16-bit length field")
            }
        }
    }
}

impl Error for ArenaError {}
