//! Error types for the PBF pipeline.

use silt_arena::ArenaError;
use std::fmt;
use std::io;

/// Errors that can occur while reading or writing PBF data.
///
/// Worker threads route their errors through the reorder queue, so the
/// consumer-facing `next_buffer`/`close` calls are the only places an
/// error surfaces. A failed blob aborts the stream; partial decode
/// results are never returned.
#[derive(Debug)]
pub enum PbfError {
    /// An underlying read or write failed.
    Io(io::Error),
    /// The byte stream violates the PBF format: a frame size out of
    /// bounds, an unexpected BlobHeader type, a failed protobuf parse,
    /// a malformed group, or an inconsistent size after inflate.
    Format {
        /// Human-readable description of the violation.
        detail: String,
    },
    /// The file requires a capability this implementation does not
    /// provide (an unknown required feature, an LZMA blob, an entity
    /// kind the format cannot carry).
    Unsupported {
        /// What was requested.
        detail: String,
    },
    /// An arena append failed. Recoverable for the writer's internal
    /// batch buffer (flush and retry); fatal anywhere else.
    Buffer(ArenaError),
    /// The writer was used after close() or after a previous failure.
    AlreadyFailed,
}

impl PbfError {
    /// Shorthand for a [`PbfError::Format`] with the given detail.
    pub fn format(detail: impl Into<String>) -> Self {
        Self::Format {
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`PbfError::Unsupported`] with the given detail.
    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::Unsupported {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PbfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Format { detail } => write!(f, "malformed PBF data: {detail}"),
            Self::Unsupported { detail } => write!(f, "unsupported: {detail}"),
            Self::Buffer(e) => write!(f, "arena error: {e}"),
            Self::AlreadyFailed => {
                write!(f, "writer is in 'error' or 'closed' state")
            }
        }
    }
}

impl std::error::Error for PbfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PbfError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ArenaError> for PbfError {
    fn from(e: ArenaError) -> Self {
        Self::Buffer(e)
    }
}
