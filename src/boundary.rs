//! Offset checkers: how far it is currently safe to write
//!
//! The writer asks its checker before every write. A checker returns the
//! absolute offset at which writing must stop, or `None` when the whole file
//! may be written. Checkers are queried often while sibling workers make
//! progress, so the stock implementations here are lock-free.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Reports the absolute offset up to which writing is currently safe.
pub trait OffsetChecker {
    /// Absolute offset where no more data should be written, or `None` if
    /// the whole file may be used.
    fn check(&self) -> Option<u64>;
}

impl<F> OffsetChecker for F
where
    F: Fn() -> Option<u64>,
{
    fn check(&self) -> Option<u64> {
        self()
    }
}

/// Checker that never restricts writing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unrestricted;

impl OffsetChecker for Unrestricted {
    fn check(&self) -> Option<u64> {
        None
    }
}

const UNRESTRICTED: u64 = u64::MAX;

/// A boundary shared between the writer and the workers that move it.
///
/// Cloning is cheap; every clone observes the same value.
///
/// # Examples
///
/// ```
/// use segwrite::boundary::{OffsetChecker, SharedBoundary};
///
/// let boundary = SharedBoundary::new(0);
/// let worker_side = boundary.clone();
///
/// worker_side.advance_to(4096);
/// worker_side.advance_to(1024); // never moves backwards
/// assert_eq!(boundary.check(), Some(4096));
///
/// worker_side.unrestrict();
/// assert_eq!(boundary.check(), None);
/// ```
#[derive(Clone, Debug)]
pub struct SharedBoundary {
    offset: Arc<AtomicU64>,
}

impl SharedBoundary {
    /// Creates a boundary at `offset`.
    #[must_use]
    pub fn new(offset: u64) -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(offset.min(UNRESTRICTED - 1))),
        }
    }

    /// Creates a boundary that does not restrict writing.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self {
            offset: Arc::new(AtomicU64::new(UNRESTRICTED)),
        }
    }

    /// Replaces the boundary, possibly moving it backwards.
    ///
    /// Moving it below what the writer already committed makes the next
    /// write fail.
    pub fn set(&self, offset: u64) {
        self.offset
            .store(offset.min(UNRESTRICTED - 1), Ordering::SeqCst);
    }

    /// Moves the boundary forward to `offset` if it is behind it.
    pub fn advance_to(&self, offset: u64) {
        self.offset
            .fetch_max(offset.min(UNRESTRICTED - 1), Ordering::SeqCst);
    }

    /// Lifts the restriction entirely.
    pub fn unrestrict(&self) {
        self.offset.store(UNRESTRICTED, Ordering::SeqCst);
    }
}

impl OffsetChecker for SharedBoundary {
    fn check(&self) -> Option<u64> {
        match self.offset.load(Ordering::SeqCst) {
            UNRESTRICTED => None,
            offset => Some(offset),
        }
    }
}

/// Read position published by a [`ChunkReader`](crate::ChunkReader).
///
/// Attach one with [`ChunkReader::with_cursor`](crate::ChunkReader::with_cursor).
#[derive(Debug, Default)]
pub struct ReadCursor {
    position: AtomicU64,
    finished: AtomicBool,
}

impl ReadCursor {
    /// Creates a cursor at `position` that has not finished yet.
    #[must_use]
    pub fn new(position: u64) -> Arc<Self> {
        Arc::new(Self {
            position: AtomicU64::new(position),
            finished: AtomicBool::new(false),
        })
    }

    /// Last published absolute position.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    /// Whether the reader was closed or reached the end of its range.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn publish(&self, position: u64, finished: bool) {
        self.position.store(position, Ordering::SeqCst);
        self.finished.store(finished, Ordering::SeqCst);
    }
}

/// Boundary for rewriting a file in place while reading its segments.
///
/// The writer must not overtake the first reader that still has bytes to
/// deliver: the boundary is one byte before that reader's position. Once
/// every reader is finished the boundary is lifted.
///
/// Readers must not be rewound after writing started, or the boundary would
/// retreat below bytes already committed.
#[derive(Clone, Debug)]
pub struct CursorBoundary {
    cursors: Vec<Arc<ReadCursor>>,
}

impl CursorBoundary {
    /// Builds a boundary over cursors ordered by segment offset.
    pub fn new(cursors: impl IntoIterator<Item = Arc<ReadCursor>>) -> Self {
        Self {
            cursors: cursors.into_iter().collect(),
        }
    }
}

impl OffsetChecker for CursorBoundary {
    fn check(&self) -> Option<u64> {
        self.cursors
            .iter()
            .find(|cursor| !cursor.is_finished())
            .map(|cursor| cursor.position().saturating_sub(1))
    }
}
