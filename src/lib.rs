//! # segwrite
//!
//! Ordered-commit file writer for segmented downloads.
//!
//! Several workers fetch disjoint byte ranges of one resource and finish in
//! any order. [`CircularWriter`] accepts their writes at arbitrary offsets and
//! guarantees that the bytes it commits to the destination always form a
//! gap-free prefix. Writes that run ahead of the safe boundary are parked in a
//! private spill file and drained into the destination once the boundary
//! catches up.
//!
//! ## Design Philosophy
//!
//! - **Synchronous** - Plain blocking I/O; callers bring their own threads
//! - **Small surface** - One [`Stream`] contract for every backend
//! - **Recoverable** - A failed call leaves the writer exactly as before it
//!
//! ## Quick Start
//!
//! ```no_run
//! use segwrite::{CircularWriter, Destination};
//! use segwrite::boundary::SharedBoundary;
//! use std::sync::{Arc, Mutex};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let boundary = SharedBoundary::new(0);
//!     let destination = Destination::open_local("movie.mkv")?;
//!     let writer = CircularWriter::new(destination, "movie.mkv.spill", boundary.clone())?;
//!     let writer = Arc::new(Mutex::new(writer));
//!
//!     // each worker: lock, seek to its range, write, unlock
//!     // the scheduler: boundary.advance_to(..) as ranges complete
//!
//!     let length = writer.lock().map_err(|_| "poisoned")?.finalize()?;
//!     println!("wrote {length} bytes");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Offset checkers
pub mod boundary;
/// Progress and write-error callbacks
pub mod callbacks;
/// Bounded range reader
pub mod chunk_reader;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Stream contract and storage backends
pub mod stream;
/// Circular buffering writer
pub mod writer;

// Re-export commonly used types
pub use boundary::{CursorBoundary, OffsetChecker, ReadCursor, SharedBoundary, Unrestricted};
pub use callbacks::{ProgressReport, WriteErrorHandle};
pub use chunk_reader::ChunkReader;
pub use config::{ReaderConfig, RetryConfig, WriterConfig};
pub use error::{Error, Result};
pub use retry::{IsRetryable, RetryPolicy};
pub use stream::{Descriptor, Destination, FileStream, PlatformStream, StorageBroker, Stream};
pub use writer::{CircularWriter, WriteRegime};
