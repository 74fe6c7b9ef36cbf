//! Byte-addressable stream abstraction
//!
//! [`Stream`] is the handle every other component programs against: a
//! positioned, seekable byte store with capability predicates. A capability
//! that a stream does not offer is reported by its `can_*` predicate and
//! fails with [`Error::Unsupported`] when used anyway.
//!
//! Two backends are provided and grouped in the closed [`Destination`] enum:
//! [`FileStream`] over a local file and [`PlatformStream`] over a descriptor
//! handed out by a [`StorageBroker`].

use crate::error::{Error, Result};
use std::path::Path;

/// Local random-access file backend
pub mod file;
/// Broker-issued descriptor backend
pub mod platform;

pub use file::FileStream;
pub use platform::{Descriptor, PlatformStream, StorageBroker};

/// A positioned byte stream with capability flags.
///
/// Every operation except [`close`](Stream::close) fails with
/// [`Error::Closed`] once the stream has been closed.
pub trait Stream {
    /// Reads up to `buf.len()` bytes at the current position.
    ///
    /// Returns the number of bytes read; `0` signals the end of the stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads a single byte, or `None` at the end of the stream.
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Writes the whole buffer at the current position.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Writes a single byte at the current position.
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Moves forward by up to `amount` bytes and returns how far it moved.
    fn skip(&mut self, amount: u64) -> Result<u64>;

    /// Moves to an absolute offset.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Moves back to offset 0.
    fn rewind(&mut self) -> Result<()> {
        if !self.can_rewind() {
            return Err(Error::Unsupported("rewind"));
        }
        self.seek(0)
    }

    /// Current length of the stream in bytes.
    fn length(&self) -> Result<u64>;

    /// Truncates or extends the stream.
    fn set_length(&mut self, length: u64) -> Result<()>;

    /// Bytes remaining between the current position and the end.
    fn available(&mut self) -> Result<u64>;

    /// Pushes buffered bytes down to the underlying resource.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases the underlying resource. Calling it again is a no-op.
    fn close(&mut self);

    /// Whether [`close`](Stream::close) has been called.
    fn is_closed(&self) -> bool;

    /// Whether [`read`](Stream::read) is supported.
    fn can_read(&self) -> bool;

    /// Whether [`write`](Stream::write) is supported.
    fn can_write(&self) -> bool;

    /// Whether [`seek`](Stream::seek) is supported.
    fn can_seek(&self) -> bool;

    /// Whether [`rewind`](Stream::rewind) is supported.
    fn can_rewind(&self) -> bool;

    /// Whether [`set_length`](Stream::set_length) is supported.
    fn can_set_length(&self) -> bool;
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (**self).write_byte(byte)
    }

    fn skip(&mut self, amount: u64) -> Result<u64> {
        (**self).skip(amount)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }

    fn length(&self) -> Result<u64> {
        (**self).length()
    }

    fn set_length(&mut self, length: u64) -> Result<()> {
        (**self).set_length(length)
    }

    fn available(&mut self) -> Result<u64> {
        (**self).available()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn can_read(&self) -> bool {
        (**self).can_read()
    }

    fn can_write(&self) -> bool {
        (**self).can_write()
    }

    fn can_seek(&self) -> bool {
        (**self).can_seek()
    }

    fn can_rewind(&self) -> bool {
        (**self).can_rewind()
    }

    fn can_set_length(&self) -> bool {
        (**self).can_set_length()
    }
}

/// The destination of a download: a local file or a broker-issued descriptor.
pub enum Destination {
    /// A local file opened read-write
    Local(FileStream),
    /// A descriptor obtained from a platform storage broker
    Platform(PlatformStream),
}

impl Destination {
    /// Opens (creating if absent) a local file as the destination.
    pub fn open_local(path: impl AsRef<Path>) -> Result<Self> {
        FileStream::open(path).map(Destination::Local)
    }

    /// Opens an existing destination through a storage broker.
    pub fn open_platform<B>(broker: &B, destination: &str) -> Result<Self>
    where
        B: StorageBroker + ?Sized,
    {
        PlatformStream::open(broker, destination).map(Destination::Platform)
    }

    fn inner(&mut self) -> &mut dyn Stream {
        match self {
            Destination::Local(s) => s,
            Destination::Platform(s) => s,
        }
    }

    fn inner_ref(&self) -> &dyn Stream {
        match self {
            Destination::Local(s) => s,
            Destination::Platform(s) => s,
        }
    }
}

impl Stream for Destination {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner().read(buf)
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        self.inner().read_byte()
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner().write(buf)
    }

    fn skip(&mut self, amount: u64) -> Result<u64> {
        self.inner().skip(amount)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner().seek(offset)
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner().rewind()
    }

    fn length(&self) -> Result<u64> {
        self.inner_ref().length()
    }

    fn set_length(&mut self, length: u64) -> Result<()> {
        self.inner().set_length(length)
    }

    fn available(&mut self) -> Result<u64> {
        self.inner().available()
    }

    fn flush(&mut self) -> Result<()> {
        self.inner().flush()
    }

    fn close(&mut self) {
        self.inner().close()
    }

    fn is_closed(&self) -> bool {
        self.inner_ref().is_closed()
    }

    fn can_read(&self) -> bool {
        self.inner_ref().can_read()
    }

    fn can_write(&self) -> bool {
        self.inner_ref().can_write()
    }

    fn can_seek(&self) -> bool {
        self.inner_ref().can_seek()
    }

    fn can_rewind(&self) -> bool {
        self.inner_ref().can_rewind()
    }

    fn can_set_length(&self) -> bool {
        self.inner_ref().can_set_length()
    }
}
