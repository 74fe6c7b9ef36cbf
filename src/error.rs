//! Error types for segwrite
//!
//! Every fallible operation in the crate returns [`Result`]. The variants carry
//! the offsets involved so a caller can tell a protocol violation (the offset
//! checker retreating, a range that does not fit its source) apart from plain
//! storage failures.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for segwrite operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for segwrite
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded range whose end does not lie after its start
    #[error("invalid range: start={start} end={end}")]
    InvalidRange {
        /// Absolute start offset requested
        start: u64,
        /// Absolute exclusive end offset requested
        end: u64,
    },

    /// The wrapped stream is shorter than the requested range
    #[error("source too short: length={length} but range ends at {end}")]
    SourceTooShort {
        /// Length reported by the wrapped stream
        length: u64,
        /// Exclusive end of the requested range
        end: u64,
    },

    /// The offset checker reported a boundary below what is already committed
    #[error("the reported offset is invalid: {reported} < {committed}")]
    BoundaryRetreated {
        /// Boundary returned by the checker
        reported: u64,
        /// Offset already committed to the destination
        committed: u64,
    },

    /// Seek target outside of the addressable range
    #[error("desired offset is outside of range=0-{length} offset={offset}")]
    SeekOutOfRange {
        /// Requested offset
        offset: u64,
        /// Largest offset the stream accepts
        length: u64,
    },

    /// Operation not supported by this stream (e.g. reading a write-only writer)
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The stream was already closed
    #[error("stream is closed")]
    Closed,

    /// The private spill file could not be created or opened
    #[error("cannot open spill file {path}: {source}")]
    SpillFile {
        /// Path of the spill file
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns the underlying I/O error kind, if this error wraps one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Error::Io(e) => Some(e.kind()),
            Error::SpillFile { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
