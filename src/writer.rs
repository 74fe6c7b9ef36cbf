//! Circular buffering writer
//!
//! [`CircularWriter`] turns out-of-order writes into a destination whose
//! committed bytes always form a gap-free prefix. Before every write it asks
//! an [`OffsetChecker`] how far it may safely write; bytes beyond that point
//! are parked in a private spill file and moved into the destination once the
//! boundary has advanced far enough.
//!
//! # Layout
//!
//! Two buffered targets are kept:
//! - `out`: the destination. Its first `out.length` bytes are final.
//! - `aux`: the spill file. It holds one contiguous run of bytes destined for
//!   `[out.length, out.length + aux.length)` of the destination.
//!
//! The logical write pointer is `out.position() + aux.position()`.
//!
//! # Atomicity
//!
//! Every public operation snapshots the bookkeeping of both targets on entry
//! and restores it if any storage call fails, so the identical call can be
//! retried. Queued bytes are only counted as committed once the storage write
//! that carries them succeeded.

use crate::boundary::OffsetChecker;
use crate::callbacks::{ProgressReport, WriteErrorHandle};
use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::stream::{FileStream, Stream};
use std::path::{Path, PathBuf};

type ErrorPolicy = Option<Box<dyn WriteErrorHandle + Send>>;

/// Where the next write goes, derived from the bookkeeping on every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteRegime {
    /// Pointer at the destination's end with nothing spilled: bytes go
    /// straight to the destination, up to the checker boundary.
    Direct,
    /// Pointer behind the destination's end (after a seek back): bytes
    /// overwrite the destination up to its end, the rest goes to the spill.
    Overwrite,
    /// Spilled bytes are pending, or the pointer lies past the destination's
    /// end: bytes go to the spill file to keep their order.
    Spilling,
}

/// A stream plus a small write queue and the offsets committed through it.
struct BufferedTarget<S: Stream> {
    stream: S,
    /// Stream offset where logical offset 0 lives (always 0 for `out`)
    base: u64,
    /// Logical offset of the first queued byte
    offset: u64,
    /// Highest logical offset ever reached
    length: u64,
    queue: Vec<u8>,
    capacity: usize,
    /// Stream position does not match `base + offset`
    needs_seek: bool,
    /// Bumped on every successful flush of a non-empty queue
    generation: u64,
}

#[derive(Clone, Copy)]
struct TargetMark {
    base: u64,
    offset: u64,
    length: u64,
    queued: usize,
    generation: u64,
}

impl<S: Stream> BufferedTarget<S> {
    fn new(stream: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stream,
            base: 0,
            offset: 0,
            length: 0,
            queue: Vec::with_capacity(capacity),
            capacity,
            needs_seek: true,
            generation: 0,
        }
    }

    /// Logical offset including the queue.
    fn position(&self) -> u64 {
        self.offset + self.queue.len() as u64
    }

    fn write(&mut self, mut buf: &[u8], policy: &mut ErrorPolicy) -> Result<()> {
        while !buf.is_empty() {
            if self.queue.len() >= self.capacity {
                self.flush(policy)?;
            }
            let take = (self.capacity - self.queue.len()).min(buf.len());
            self.queue.extend_from_slice(&buf[..take]);
            buf = &buf[take..];
        }

        self.length = self.length.max(self.position());
        Ok(())
    }

    fn flush(&mut self, policy: &mut ErrorPolicy) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }

        let at = self.base + self.offset;
        if self.needs_seek {
            self.stream.seek(at)?;
            self.needs_seek = false;
        }
        write_proof(&mut self.stream, at, &self.queue, policy)?;

        self.offset += self.queue.len() as u64;
        self.queue.clear();
        self.generation += 1;
        Ok(())
    }

    /// Moves the pointer. The queue must have been flushed.
    fn seek(&mut self, offset: u64) {
        debug_assert!(self.queue.is_empty(), "seek with pending queue");
        self.offset = offset;
        self.needs_seek = true;
    }

    fn mark(&self) -> TargetMark {
        TargetMark {
            base: self.base,
            offset: self.offset,
            length: self.length,
            queued: self.queue.len(),
            generation: self.generation,
        }
    }

    fn restore(&mut self, mark: &TargetMark) {
        self.offset = if self.generation == mark.generation {
            self.queue.truncate(mark.queued);
            mark.offset
        } else {
            // the queue held at entry reached the stream before the failure
            self.queue.clear();
            mark.offset + mark.queued as u64
        };
        self.base = mark.base;
        self.length = mark.length;
        self.needs_seek = true;
    }

    fn close(&mut self) {
        self.queue = Vec::new();
        self.stream.close();
    }
}

impl<S: Stream> std::fmt::Debug for BufferedTarget<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedTarget")
            .field("base", &self.base)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("queue", &self.queue.len())
            .finish()
    }
}

/// Writes `buf` at the stream's current position, which must be `at`.
///
/// Failures go to the write-error policy; on retry the stream is re-seeked to
/// `at` first since a failed write may have moved it.
fn write_proof<S: Stream>(
    stream: &mut S,
    at: u64,
    buf: &[u8],
    policy: &mut ErrorPolicy,
) -> Result<()> {
    let Some(handler) = policy.as_mut() else {
        return stream.write(buf);
    };

    let mut retried = false;
    loop {
        let attempt = if retried {
            stream.seek(at).and_then(|()| stream.write(buf))
        } else {
            stream.write(buf)
        };

        match attempt {
            Ok(()) => {
                if retried {
                    handler.recovered();
                }
                return Ok(());
            }
            Err(e) => {
                if !handler.handle(&e) {
                    return Err(e);
                }
                tracing::debug!(offset = at, len = buf.len(), error = %e, "Retrying storage write");
                retried = true;
            }
        }
    }
}

struct Snapshot {
    out: TargetMark,
    aux: TargetMark,
    max_length: u64,
    report_position: u64,
}

/// Write-only stream that reorders out-of-order writes into a contiguous
/// destination.
///
/// One writer serves one destination for one download session. It does no
/// locking: callers feeding it from several workers must serialize calls.
///
/// # Examples
///
/// ```no_run
/// use segwrite::{CircularWriter, Destination, Stream};
/// use segwrite::boundary::SharedBoundary;
///
/// # fn example() -> segwrite::Result<()> {
/// let destination = Destination::open_local("video.mp4")?;
/// let boundary = SharedBoundary::new(0);
/// let mut writer = CircularWriter::new(destination, "video.mp4.spill", boundary.clone())?;
///
/// // a second worker already has bytes for [4096, 8192)
/// writer.seek(4096)?;
/// writer.write(&[0u8; 4096])?; // parked in the spill file
///
/// // the first worker finishes [0, 4096)
/// boundary.advance_to(8192);
/// writer.seek(0)?;
/// writer.write(&[1u8; 4096])?;
///
/// let length = writer.finalize()?;
/// assert_eq!(length, 8192);
/// # Ok(())
/// # }
/// ```
pub struct CircularWriter<S: Stream> {
    out: BufferedTarget<S>,
    aux: BufferedTarget<FileStream>,
    checker: Box<dyn OffsetChecker + Send>,
    on_progress: Option<Box<dyn ProgressReport + Send>>,
    on_write_error: ErrorPolicy,
    config: WriterConfig,
    spill_path: PathBuf,
    max_length: u64,
    report_position: u64,
    /// A drain left the spill file needing compaction or truncation
    spill_maintenance: bool,
    closed: bool,
}

impl<S: Stream> CircularWriter<S> {
    /// Creates a writer over `target`, spilling into `spill_path`.
    ///
    /// The spill file is created if absent. If it cannot be opened, `target`
    /// is closed and [`Error::SpillFile`] is returned.
    pub fn new(
        target: S,
        spill_path: impl AsRef<Path>,
        checker: impl OffsetChecker + Send + 'static,
    ) -> Result<Self> {
        Self::with_config(target, spill_path, checker, WriterConfig::default())
    }

    /// Like [`new`](Self::new) with explicit buffering settings.
    pub fn with_config(
        mut target: S,
        spill_path: impl AsRef<Path>,
        checker: impl OffsetChecker + Send + 'static,
        config: WriterConfig,
    ) -> Result<Self> {
        let spill_path = spill_path.as_ref().to_path_buf();
        let spill = match FileStream::open(&spill_path) {
            Ok(spill) => spill,
            Err(Error::Io(source)) => {
                target.close();
                return Err(Error::SpillFile {
                    path: spill_path,
                    source,
                });
            }
            Err(e) => {
                target.close();
                return Err(e);
            }
        };

        tracing::debug!(
            spill = %spill_path.display(),
            drain_threshold = config.drain_threshold,
            "Created circular writer"
        );

        Ok(Self {
            out: BufferedTarget::new(target, config.queue_buffer_size),
            aux: BufferedTarget::new(spill, config.queue_buffer_size),
            checker: Box::new(checker),
            on_progress: None,
            on_write_error: None,
            report_position: config.notify_interval,
            config,
            spill_path,
            max_length: 0,
            spill_maintenance: false,
            closed: false,
        })
    }

    /// Installs the progress sink.
    pub fn set_progress_report(&mut self, progress: impl ProgressReport + Send + 'static) {
        self.on_progress = Some(Box::new(progress));
    }

    /// Installs the write-error policy. Without one, the first storage
    /// failure propagates.
    pub fn set_write_error_handle(&mut self, handle: impl WriteErrorHandle + Send + 'static) {
        self.on_write_error = Some(Box::new(handle));
    }

    /// Logical write pointer.
    pub fn position(&self) -> u64 {
        self.out.position() + self.aux.position()
    }

    /// Bytes known to be final in the destination.
    pub fn destination_length(&self) -> u64 {
        self.out.length
    }

    /// Bytes parked in the spill file, waiting to be drained.
    pub fn spill_length(&self) -> u64 {
        self.aux.length
    }

    /// Path of the private spill file.
    pub fn spill_path(&self) -> &Path {
        &self.spill_path
    }

    /// Where the next write would go.
    pub fn regime(&self) -> WriteRegime {
        if self.out.position() < self.out.length {
            WriteRegime::Overwrite
        } else if self.aux.length > 0 || self.aux.position() > 0 {
            WriteRegime::Spilling
        } else {
            WriteRegime::Direct
        }
    }

    /// Drains everything, fixes the destination length and closes the
    /// writer.
    ///
    /// This is the only path that guarantees a complete destination. Call it
    /// once, after every worker finished. Returns the final length.
    pub fn finalize(&mut self) -> Result<u64> {
        self.ensure_open()?;

        let length = self.atomically(|w| {
            w.drain(w.aux.length)?;
            w.out.flush(&mut w.on_write_error)?;

            let length = w.max_length.max(w.out.length);
            if length != w.out.stream.length()? {
                w.out.stream.set_length(length)?;
            }
            Ok(length)
        })?;

        tracing::debug!(length, "Finalized destination");
        self.close();
        Ok(length)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            out: self.out.mark(),
            aux: self.aux.mark(),
            max_length: self.max_length,
            report_position: self.report_position,
        }
    }

    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.snapshot();
        let result = op(self);
        if result.is_err() {
            self.out.restore(&snapshot.out);
            self.aux.restore(&snapshot.aux);
            self.max_length = snapshot.max_length;
            self.report_position = snapshot.report_position;
            self.spill_maintenance = false;
        } else if self.spill_maintenance {
            // only once committed: a rollback still needs the drained bytes
            self.spill_maintenance = false;
            self.maintain_spill();
        }
        result
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<()> {
        let len = buf.len() as u64;
        let offset_out = self.out.position();

        let available = match self.checker.check() {
            None => u64::MAX,
            Some(boundary) if boundary < offset_out => {
                return Err(Error::BoundaryRetreated {
                    reported: boundary,
                    committed: offset_out,
                });
            }
            Some(boundary) => boundary - offset_out,
        };

        match self.regime() {
            WriteRegime::Spilling => {
                let length = self.aux.length.max(self.aux.position() + len);
                if self.aux.position() > self.aux.length {
                    self.discard_stale_spill()?;
                }
                self.aux.write(buf, &mut self.on_write_error)?;

                if length >= self.config.drain_threshold && length <= available {
                    self.drain(available)?;
                }
            }
            regime => {
                let limit = match regime {
                    WriteRegime::Overwrite => self.out.length - offset_out,
                    _ => available,
                };
                // limit.min(len) never exceeds buf.len()
                let direct = limit.min(len) as usize;
                let (head, tail) = buf.split_at(direct);

                if !head.is_empty() {
                    self.out.write(head, &mut self.on_write_error)?;
                }
                if !tail.is_empty() {
                    self.aux.write(tail, &mut self.on_write_error)?;
                }
            }
        }

        if let Some(progress) = self.on_progress.as_mut() {
            let absolute = self.out.position() + self.aux.position();
            if absolute > self.report_position {
                self.report_position = absolute + self.config.notify_interval;
                progress.report(absolute);
            }
        }

        Ok(())
    }

    /// Moves up to `amount` spilled bytes into the destination.
    ///
    /// The public operations always drain the whole run: `write` only when
    /// the boundary covers all of it, `finalize` unconditionally. A smaller
    /// `amount` leaves a tail behind `aux.base`, which is moved to the front
    /// once the enclosing operation commits.
    fn drain(&mut self, amount: u64) -> Result<()> {
        if self.aux.length == 0 {
            return Ok(());
        }

        self.out.flush(&mut self.on_write_error)?;
        self.aux.flush(&mut self.on_write_error)?;

        let underflow = self.aux.offset < self.aux.length || self.out.offset < self.out.length;
        let mut amount = amount.min(self.aux.length);

        let mut buffer = vec![0u8; self.config.copy_buffer_size.max(1)];
        self.aux.needs_seek = true;
        self.out.needs_seek = true;
        self.aux.stream.seek(self.aux.base)?;
        self.out.stream.seek(self.out.length)?;

        let mut copied = 0u64;
        while copied < amount {
            let want = (amount - copied).min(buffer.len() as u64) as usize;
            let read = self.aux.stream.read(&mut buffer[..want])?;
            if read == 0 {
                amount = copied;
                break;
            }
            write_proof(
                &mut self.out.stream,
                self.out.length + copied,
                &buffer[..read],
                &mut self.on_write_error,
            )?;
            copied += read as u64;
        }

        if underflow {
            if self.out.offset >= self.out.length {
                if self.aux.offset < amount {
                    // the pointer now lies inside the drained bytes
                    self.out.offset += self.aux.offset;
                    self.aux.offset = 0;
                } else {
                    self.aux.offset -= amount;
                    self.out.offset = self.out.length + amount;
                }
            } else {
                self.aux.offset = 0;
            }
        } else {
            self.out.offset += amount;
            self.aux.offset -= amount;
        }

        self.out.length += amount;
        self.max_length = self.max_length.max(self.out.length);

        if amount < self.aux.length {
            self.aux.base += amount;
            self.aux.length -= amount;
        } else {
            self.aux.base = 0;
            self.aux.length = 0;
        }
        self.spill_maintenance = true;

        tracing::debug!(
            drained = amount,
            destination_length = self.out.length,
            spilled = self.aux.length,
            "Drained spill file into destination"
        );
        Ok(())
    }

    /// Cuts the spill file at the end of the live run so a gap left by a
    /// forward seek reads back as zeros, not as bytes of an earlier run.
    fn discard_stale_spill(&mut self) -> Result<()> {
        let live_end = self.aux.base + self.aux.length;
        if self.aux.stream.length()? > live_end {
            self.aux.stream.set_length(live_end)?;
            self.aux.needs_seek = true;
        }
        Ok(())
    }

    fn maintain_spill(&mut self) {
        if self.aux.length == 0 {
            self.trim_spill();
        } else {
            let mut buffer = vec![0u8; self.config.copy_buffer_size.max(1)];
            self.compact_spill(&mut buffer);
        }
    }

    /// Moves the pending run back to the start of the spill file once it no
    /// longer overlaps it. Best effort: on failure the run stays where it is.
    fn compact_spill(&mut self, buffer: &mut [u8]) {
        let aux = &mut self.aux;
        if aux.base < aux.length {
            return;
        }

        let moved = move_to_front(
            &mut aux.stream,
            aux.base,
            aux.length,
            buffer,
            &mut self.on_write_error,
        );
        match moved {
            Ok(()) => {
                aux.base = 0;
                if let Err(e) = aux.stream.set_length(aux.length) {
                    tracing::warn!(error = %e, "Failed to shrink spill file");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, base = aux.base, "Failed to compact spill file");
            }
        }
        aux.needs_seek = true;
    }

    /// Shrinks a fully drained spill file down to the residual size.
    fn trim_spill(&mut self) {
        let residual = self.config.spill_residual;
        match self.aux.stream.length() {
            Ok(length) if length > residual => {
                if let Err(e) = self.aux.stream.set_length(residual) {
                    tracing::warn!(error = %e, "Failed to truncate spill file");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to query spill file length"),
        }
    }

    fn flush_inner(&mut self) -> Result<()> {
        self.aux.flush(&mut self.on_write_error)?;
        self.out.flush(&mut self.on_write_error)?;

        // remembered in case the pointer is moved back
        self.max_length = self.max_length.max(self.out.length + self.aux.length);
        Ok(())
    }

    fn seek_inner(&mut self, offset: u64) -> Result<()> {
        let limit = i64::MAX as u64;
        if offset > limit {
            return Err(Error::SeekOutOfRange {
                offset,
                length: limit,
            });
        }

        let total = self.out.length + self.aux.length;
        if offset == total && self.position() == total {
            return Ok(());
        }

        self.flush_inner()?;

        if offset > self.out.length {
            self.out.seek(self.out.length);
            self.aux.seek(offset - self.out.length);
        } else {
            self.out.seek(offset);
            self.aux.seek(0);
        }
        tracing::trace!(offset, "Moved write pointer");
        Ok(())
    }
}

impl<S: Stream> Stream for CircularWriter<S> {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::Unsupported("write-only"))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        Err(Error::Unsupported("write-only"))
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(());
        }
        self.atomically(|w| w.write_inner(buf))
    }

    /// Moves the pointer forward; always returns `amount`.
    fn skip(&mut self, amount: u64) -> Result<u64> {
        self.ensure_open()?;
        let target = self.position().saturating_add(amount);
        self.atomically(|w| w.seek_inner(target))?;
        Ok(amount)
    }

    /// Moves the pointer to `offset`.
    ///
    /// Offsets past the known end are accepted: the gap is filled with
    /// whatever is written there later.
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.ensure_open()?;
        self.atomically(|w| w.seek_inner(offset))
    }

    fn rewind(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.atomically(|w| w.seek_inner(0))?;
        self.report_position = self.config.notify_interval;
        if let Some(progress) = self.on_progress.as_mut() {
            progress.report(0);
        }
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.out.length + self.aux.length)
    }

    fn set_length(&mut self, _length: u64) -> Result<()> {
        Err(Error::Unsupported("set_length"))
    }

    fn available(&mut self) -> Result<u64> {
        Err(Error::Unsupported("write-only"))
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.atomically(|w| w.flush_inner())
    }

    /// Closes both streams without draining. The destination keeps whatever
    /// partial state it had.
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.out.close();
        self.aux.close();

        if !self.config.keep_spill_file {
            if let Err(e) = std::fs::remove_file(&self.spill_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        spill = %self.spill_path.display(),
                        error = %e,
                        "Failed to remove spill file"
                    );
                }
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn can_read(&self) -> bool {
        false
    }

    fn can_write(&self) -> bool {
        true
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

impl<S: Stream> Drop for CircularWriter<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: Stream> std::fmt::Debug for CircularWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularWriter")
            .field("out", &self.out)
            .field("aux", &self.aux)
            .field("max_length", &self.max_length)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Copies `[from, from + len)` of `stream` to `[0, len)`. The ranges must
/// not overlap.
fn move_to_front<S: Stream>(
    stream: &mut S,
    from: u64,
    len: u64,
    buffer: &mut [u8],
    policy: &mut ErrorPolicy,
) -> Result<()> {
    let mut moved = 0u64;
    while moved < len {
        let want = (len - moved).min(buffer.len() as u64) as usize;
        stream.seek(from + moved)?;
        let read = stream.read(&mut buffer[..want])?;
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "spill file shorter than its pending run",
            )
            .into());
        }
        stream.seek(moved)?;
        write_proof(stream, moved, &buffer[..read], policy)?;
        moved += read as u64;
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{SharedBoundary, Unrestricted};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// File stream whose next `failures` writes fail after writing half the
    /// buffer, and whose next `truncate_failures` length changes fail.
    struct FlakyStream {
        inner: FileStream,
        failures: Arc<AtomicUsize>,
        truncate_failures: Arc<AtomicUsize>,
    }

    impl Stream for FlakyStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.inner.read(buf)
        }

        fn write(&mut self, buf: &[u8]) -> Result<()> {
            let pending = self.failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.failures.store(pending - 1, Ordering::SeqCst);
                self.inner.write(&buf[..buf.len() / 2])?;
                return Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "flaky").into());
            }
            self.inner.write(buf)
        }

        fn skip(&mut self, amount: u64) -> Result<u64> {
            self.inner.skip(amount)
        }

        fn seek(&mut self, offset: u64) -> Result<()> {
            self.inner.seek(offset)
        }

        fn length(&self) -> Result<u64> {
            self.inner.length()
        }

        fn set_length(&mut self, length: u64) -> Result<()> {
            let pending = self.truncate_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.truncate_failures.store(pending - 1, Ordering::SeqCst);
                return Err(std::io::Error::new(std::io::ErrorKind::Interrupted, "flaky").into());
            }
            self.inner.set_length(length)
        }

        fn available(&mut self) -> Result<u64> {
            self.inner.available()
        }

        fn close(&mut self) {
            self.inner.close()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }

        fn can_read(&self) -> bool {
            true
        }

        fn can_write(&self) -> bool {
            true
        }

        fn can_seek(&self) -> bool {
            true
        }

        fn can_rewind(&self) -> bool {
            true
        }

        fn can_set_length(&self) -> bool {
            true
        }
    }

    fn small_config() -> WriterConfig {
        WriterConfig {
            queue_buffer_size: 16,
            copy_buffer_size: 32,
            notify_interval: 64,
            drain_threshold: 64,
            spill_residual: 0,
            keep_spill_file: false,
        }
    }

    fn flaky_writer(
        dir: &tempfile::TempDir,
        checker: impl OffsetChecker + Send + 'static,
    ) -> (CircularWriter<FlakyStream>, Arc<AtomicUsize>) {
        let (writer, failures, _) = flaky_writer_with(dir, checker, small_config());
        (writer, failures)
    }

    fn flaky_writer_with(
        dir: &tempfile::TempDir,
        checker: impl OffsetChecker + Send + 'static,
        config: WriterConfig,
    ) -> (
        CircularWriter<FlakyStream>,
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
    ) {
        let failures = Arc::new(AtomicUsize::new(0));
        let truncate_failures = Arc::new(AtomicUsize::new(0));
        let out = FlakyStream {
            inner: FileStream::open(dir.path().join("out.bin")).unwrap(),
            failures: failures.clone(),
            truncate_failures: truncate_failures.clone(),
        };
        let writer =
            CircularWriter::with_config(out, dir.path().join("spill.bin"), checker, config)
                .unwrap();
        (writer, failures, truncate_failures)
    }

    #[test]
    fn regime_follows_pointer_and_spill() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = SharedBoundary::new(8);
        let (mut writer, _) = flaky_writer(&dir, boundary.clone());

        assert_eq!(writer.regime(), WriteRegime::Direct);

        writer.write(&[1u8; 12]).unwrap();
        assert_eq!(writer.destination_length(), 8);
        assert_eq!(writer.spill_length(), 4);
        assert_eq!(writer.regime(), WriteRegime::Spilling);

        writer.seek(2).unwrap();
        assert_eq!(writer.regime(), WriteRegime::Overwrite);
    }

    #[test]
    fn seek_past_end_starts_spilling() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, _) = flaky_writer(&dir, Unrestricted);

        writer.seek(10).unwrap();
        assert_eq!(writer.position(), 10);
        assert_eq!(writer.regime(), WriteRegime::Spilling);
    }

    #[test]
    fn partial_drain_keeps_tail_and_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = SharedBoundary::new(0);
        let (mut writer, _) = flaky_writer(&dir, boundary.clone());

        let data: Vec<u8> = (0..40u8).collect();
        writer.write(&data).unwrap();
        assert_eq!(writer.spill_length(), 40);

        writer.atomically(|w| w.drain(30)).unwrap();
        assert_eq!(writer.destination_length(), 30);
        assert_eq!(writer.spill_length(), 10);
        assert_eq!(writer.position(), 40);
        // live run [30, 40) no longer overlaps [0, 10): moved to the front
        assert_eq!(writer.aux.base, 0);

        boundary.unrestrict();
        writer.write(&[40, 41]).unwrap();
        assert_eq!(writer.finalize().unwrap(), 42);

        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(written, (0..42u8).collect::<Vec<_>>());
    }

    #[test]
    fn partial_drain_with_overlap_keeps_base_offset() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = SharedBoundary::new(0);
        let (mut writer, _) = flaky_writer(&dir, boundary.clone());

        let data: Vec<u8> = (0..40u8).collect();
        writer.write(&data).unwrap();

        writer.atomically(|w| w.drain(10)).unwrap();
        assert_eq!(writer.aux.base, 10);
        assert_eq!(writer.spill_length(), 30);

        boundary.unrestrict();
        assert_eq!(writer.finalize().unwrap(), 40);
        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn drain_after_seek_back_into_spill_lands_pointer_in_destination() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = SharedBoundary::new(0);
        let (mut writer, _) = flaky_writer(&dir, boundary.clone());

        writer.write(&[0xAA; 40]).unwrap();
        writer.seek(5).unwrap();
        assert_eq!(writer.regime(), WriteRegime::Spilling);

        writer.atomically(|w| w.drain(40)).unwrap();
        assert_eq!(writer.position(), 5);
        assert_eq!(writer.regime(), WriteRegime::Overwrite);

        boundary.unrestrict();
        writer.write(&[0xBB; 5]).unwrap();
        assert_eq!(writer.finalize().unwrap(), 40);

        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(&written[..5], &[0xAA; 5]);
        assert_eq!(&written[5..10], &[0xBB; 5]);
        assert!(written[10..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn failed_finalize_keeps_spill_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.bin"), [0x55u8; 500]).unwrap();
        let boundary = SharedBoundary::new(0);
        let (mut writer, _, truncate_failures) =
            flaky_writer_with(&dir, boundary.clone(), small_config());

        let data: Vec<u8> = (0..100u8).collect();
        writer.write(&data).unwrap();
        boundary.unrestrict();

        // the stale 500-byte destination must be cut down to 100
        truncate_failures.store(1, Ordering::SeqCst);
        let err = writer.finalize().unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::Interrupted));
        assert!(!writer.is_closed());
        assert_eq!(writer.destination_length(), 0);
        assert_eq!(writer.spill_length(), 100);
        let spill_size = std::fs::metadata(dir.path().join("spill.bin")).unwrap().len();
        assert_eq!(spill_size, 100, "spill content survives the failed call");

        assert_eq!(writer.finalize().unwrap(), 100);
        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn gap_after_reused_spill_reads_back_as_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = SharedBoundary::new(0);
        let config = WriterConfig {
            spill_residual: 1024 * 1024,
            ..small_config()
        };
        let (mut writer, _, _) = flaky_writer_with(&dir, boundary.clone(), config);

        writer.write(&[0xEE; 100]).unwrap();
        boundary.unrestrict();
        writer.write(&[0xEE]).unwrap();
        assert_eq!(writer.destination_length(), 101);
        assert_eq!(writer.spill_length(), 0);

        assert_eq!(writer.skip(20).unwrap(), 20);
        writer.write(&[0x11; 5]).unwrap();
        assert_eq!(writer.finalize().unwrap(), 126);

        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert!(written[..101].iter().all(|&b| b == 0xEE));
        assert!(written[101..121].iter().all(|&b| b == 0), "gap holds stale bytes");
        assert!(written[121..].iter().all(|&b| b == 0x11));
    }

    #[test]
    fn failed_rewind_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, failures) = flaky_writer(&dir, Unrestricted);
        let reports = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = reports.clone();
        writer.set_progress_report(move |p: u64| sink.lock().unwrap().push(p));

        writer.write(&[1u8; 10]).unwrap();
        failures.store(1, Ordering::SeqCst);
        assert!(writer.rewind().is_err());
        assert!(reports.lock().unwrap().is_empty());
        assert_eq!(writer.position(), 10);

        writer.rewind().unwrap();
        assert_eq!(*reports.lock().unwrap(), vec![0]);
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn failed_write_without_policy_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, failures) = flaky_writer(&dir, Unrestricted);

        writer.write(&[1u8; 10]).unwrap();
        failures.store(1, Ordering::SeqCst);

        // 20 more bytes overflow the 16-byte queue and force a flush
        let err = writer.write(&[2u8; 20]).unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::Interrupted));
        assert_eq!(writer.position(), 10);
        assert_eq!(writer.destination_length(), 10);

        writer.write(&[2u8; 20]).unwrap();
        assert_eq!(writer.finalize().unwrap(), 30);

        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(&written[..10], &[1u8; 10]);
        assert_eq!(&written[10..], &[2u8; 20]);
    }

    #[test]
    fn policy_retries_at_the_same_offset() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, failures) = flaky_writer(&dir, Unrestricted);
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        writer.set_write_error_handle(move |_: &Error| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        failures.store(2, Ordering::SeqCst);
        let data: Vec<u8> = (0..50u8).collect();
        writer.write(&data).unwrap();
        assert_eq!(writer.finalize().unwrap(), 50);

        assert_eq!(handled.load(Ordering::SeqCst), 2);
        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(written, data);
    }

    #[test]
    fn policy_refusal_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, failures) = flaky_writer(&dir, Unrestricted);
        writer.set_write_error_handle(|_: &Error| false);

        failures.store(1, Ordering::SeqCst);
        assert!(writer.write(&[0u8; 40]).is_err());
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn reads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, _) = flaky_writer(&dir, Unrestricted);

        assert!(!writer.can_read());
        assert!(matches!(
            writer.read(&mut [0u8; 4]),
            Err(Error::Unsupported("write-only"))
        ));
        assert!(matches!(
            writer.read_byte(),
            Err(Error::Unsupported("write-only"))
        ));
        assert!(matches!(
            writer.available(),
            Err(Error::Unsupported("write-only"))
        ));
    }

    #[test]
    fn seek_beyond_signed_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, _) = flaky_writer(&dir, Unrestricted);
        assert!(matches!(
            writer.seek(u64::MAX),
            Err(Error::SeekOutOfRange { .. })
        ));
    }

    #[test]
    fn spill_file_is_removed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let (mut writer, _) = flaky_writer(&dir, SharedBoundary::new(0));
        writer.write(&[1u8; 8]).unwrap();
        writer.flush().unwrap();
        assert!(dir.path().join("spill.bin").exists());

        writer.close();
        assert!(!dir.path().join("spill.bin").exists());
    }
}
