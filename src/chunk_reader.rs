//! Bounded-range reader
//!
//! [`ChunkReader`] exposes the `[start, end)` slice of another stream as a
//! zero-based stream of its own. It is used to re-read one segment that was
//! already written, for instance while rewriting a file in place.

use crate::boundary::ReadCursor;
use crate::callbacks::ProgressReport;
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::stream::Stream;
use std::sync::Arc;

/// Read-only view over `[start, end)` of a wrapped stream.
///
/// Reads never cross `end`: once the range is exhausted `read` returns `0`
/// and `read_byte` returns `None`, even if the wrapped stream has more.
///
/// # Examples
///
/// ```no_run
/// use segwrite::{ChunkReader, FileStream, Stream};
///
/// # fn example() -> segwrite::Result<()> {
/// let source = FileStream::open("download.part")?;
/// let mut segment = ChunkReader::new(source, 1024, 2048, None)?;
///
/// let mut buf = vec![0u8; 4096];
/// let n = segment.read(&mut buf)?; // at most 1024 bytes
/// assert!(n <= 1024);
/// # Ok(())
/// # }
/// ```
pub struct ChunkReader<S: Stream> {
    source: S,
    start: u64,
    end: u64,
    position: u64,
    progress: Option<Box<dyn ProgressReport + Send>>,
    report_interval: u64,
    next_report: u64,
    cursor: Option<Arc<ReadCursor>>,
}

impl<S: Stream> ChunkReader<S> {
    /// Wraps `source`, exposing `[start, end)` of it.
    ///
    /// Fails if `end <= start` or if `source` is shorter than `end`; the
    /// source is closed in both cases. On success the source is positioned
    /// at `start`.
    pub fn new(
        source: S,
        start: u64,
        end: u64,
        progress: Option<Box<dyn ProgressReport + Send>>,
    ) -> Result<Self> {
        Self::with_config(source, start, end, progress, &ReaderConfig::default())
    }

    /// Wraps `source` from `start` to its current end.
    pub fn to_end(
        mut source: S,
        start: u64,
        progress: Option<Box<dyn ProgressReport + Send>>,
    ) -> Result<Self> {
        let end = match source.length() {
            Ok(end) => end,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        Self::new(source, start, end, progress)
    }

    /// Like [`new`](Self::new) with an explicit report interval.
    pub fn with_config(
        mut source: S,
        start: u64,
        end: u64,
        progress: Option<Box<dyn ProgressReport + Send>>,
        config: &ReaderConfig,
    ) -> Result<Self> {
        if let Err(e) = Self::validate(&mut source, start, end) {
            source.close();
            return Err(e);
        }

        let report_interval = config.report_interval.max(1);
        Ok(Self {
            source,
            start,
            end,
            position: 0,
            progress,
            report_interval,
            next_report: report_interval,
            cursor: None,
        })
    }

    fn validate(source: &mut S, start: u64, end: u64) -> Result<()> {
        if end <= start {
            return Err(Error::InvalidRange { start, end });
        }
        let length = source.length()?;
        if length < end {
            return Err(Error::SourceTooShort { length, end });
        }
        source.seek(start)
    }

    /// Publishes the absolute position into `cursor` after every move.
    #[must_use]
    pub fn with_cursor(mut self, cursor: Arc<ReadCursor>) -> Self {
        self.cursor = Some(cursor);
        self.publish();
        self
    }

    /// Absolute start of the range.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute exclusive end of the range.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Position relative to `start`.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Position in the wrapped stream, `start + position`.
    pub fn absolute_position(&self) -> u64 {
        self.start + self.position
    }

    /// Gives the wrapped stream back, positioned at
    /// [`absolute_position`](Self::absolute_position).
    pub fn into_inner(self) -> S {
        self.source
    }

    fn len(&self) -> u64 {
        self.end - self.start
    }

    fn remaining(&self) -> u64 {
        self.len() - self.position
    }

    fn ensure_open(&self) -> Result<()> {
        if self.source.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn publish(&self) {
        if let Some(cursor) = &self.cursor {
            let finished = self.source.is_closed() || self.position >= self.len();
            cursor.publish(self.absolute_position(), finished);
        }
    }

    fn notify_progress(&mut self) {
        if self.position < self.next_report {
            return;
        }
        self.next_report = (self.position / self.report_interval + 1) * self.report_interval;
        if let Some(progress) = self.progress.as_mut() {
            progress.report(self.start + self.position);
        }
    }
}

impl<S: Stream> Stream for ChunkReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let wanted = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = self.source.read(&mut buf[..wanted])?;
        self.position += read as u64;

        self.notify_progress();
        self.publish();
        Ok(read)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.ensure_open()?;
        if self.remaining() == 0 {
            return Ok(None);
        }

        let byte = self.source.read_byte()?;
        if byte.is_some() {
            self.position += 1;
            self.notify_progress();
            self.publish();
        }
        Ok(byte)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<()> {
        Err(Error::Unsupported("read-only"))
    }

    fn skip(&mut self, amount: u64) -> Result<u64> {
        self.ensure_open()?;
        let skipped = amount.min(self.remaining());
        if skipped > 0 {
            self.source.seek(self.absolute_position() + skipped)?;
            self.position += skipped;
            self.publish();
        }
        Ok(skipped)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.ensure_open()?;
        if offset > self.len() {
            return Err(Error::SeekOutOfRange {
                offset,
                length: self.len(),
            });
        }
        self.source.seek(self.start + offset)?;
        self.position = offset;
        self.publish();
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.source.seek(self.start)?;
        self.position = 0;
        self.next_report = self.report_interval;
        self.publish();
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.len())
    }

    fn set_length(&mut self, _length: u64) -> Result<()> {
        Err(Error::Unsupported("read-only"))
    }

    fn available(&mut self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.remaining())
    }

    fn close(&mut self) {
        self.source.close();
        self.publish();
    }

    fn is_closed(&self) -> bool {
        self.source.is_closed()
    }

    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        false
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn can_rewind(&self) -> bool {
        true
    }

    fn can_set_length(&self) -> bool {
        false
    }
}
