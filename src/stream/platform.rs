use crate::error::{Error, Result};
use crate::stream::Stream;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// Hands out descriptors for destinations the process cannot open by path.
///
/// The destination must already exist and support random-access reads and
/// writes; virtual destinations that only stream are not usable here.
pub trait StorageBroker {
    /// Opens a read-write descriptor for `destination`.
    fn open_descriptor(&self, destination: &str) -> Result<Box<dyn Descriptor>>;
}

/// A descriptor issued by a [`StorageBroker`].
pub trait Descriptor: Send {
    /// Opens another channel over the same descriptor.
    fn channel(&self) -> std::io::Result<File>;

    /// Returns the descriptor to the broker.
    fn release(self: Box<Self>) -> std::io::Result<()>;
}

impl Descriptor for File {
    fn channel(&self) -> std::io::Result<File> {
        self.try_clone()
    }

    fn release(self: Box<Self>) -> std::io::Result<()> {
        drop(self);
        Ok(())
    }
}

/// [`Stream`] over a broker-issued descriptor.
///
/// Keeps separate read and write channels over the descriptor. The channels
/// may or may not share a kernel file offset, so the position lives here and
/// is applied to the write channel on every move and to the read channel
/// before every read.
pub struct PlatformStream {
    descriptor: Option<Box<dyn Descriptor>>,
    reader: Option<File>,
    writer: Option<File>,
    position: u64,
    destination: String,
}

impl PlatformStream {
    /// Opens `destination` through `broker`.
    ///
    /// If a channel cannot be opened the descriptor is released before the
    /// error is returned.
    pub fn open<B>(broker: &B, destination: &str) -> Result<Self>
    where
        B: StorageBroker + ?Sized,
    {
        let descriptor = broker.open_descriptor(destination)?;

        let channels = descriptor.channel().and_then(|mut reader| {
            let mut writer = descriptor.channel()?;
            reader.seek(SeekFrom::Start(0))?;
            writer.seek(SeekFrom::Start(0))?;
            Ok((reader, writer))
        });

        let (reader, writer) = match channels {
            Ok(channels) => channels,
            Err(e) => {
                if let Err(release_err) = descriptor.release() {
                    tracing::warn!(
                        destination,
                        error = %release_err,
                        "Failed to release descriptor after channel setup failed"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::debug!(destination, "Opened platform stream");

        Ok(Self {
            descriptor: Some(descriptor),
            reader: Some(reader),
            writer: Some(writer),
            position: 0,
            destination: destination.to_string(),
        })
    }

    /// Identifier the stream was opened with.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn writer(&mut self) -> Result<&mut File> {
        self.writer.as_mut().ok_or(Error::Closed)
    }

    fn move_to(&mut self, offset: u64) -> Result<()> {
        self.writer()?.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }
}

impl Stream for PlatformStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let position = self.position;
        let reader = self.reader.as_mut().ok_or(Error::Closed)?;
        reader.seek(SeekFrom::Start(position))?;
        let read = reader.read(buf)?;
        self.move_to(position + read as u64)?;
        Ok(read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer()?.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn skip(&mut self, amount: u64) -> Result<u64> {
        let remaining = self.length()?.saturating_sub(self.position);
        let skipped = amount.min(remaining);
        self.move_to(self.position + skipped)?;
        Ok(skipped)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.move_to(offset)
    }

    fn length(&self) -> Result<u64> {
        let writer = self.writer.as_ref().ok_or(Error::Closed)?;
        Ok(writer.metadata()?.len())
    }

    fn set_length(&mut self, length: u64) -> Result<()> {
        self.writer()?.set_len(length)?;
        Ok(())
    }

    fn available(&mut self) -> Result<u64> {
        Ok(self.length()?.saturating_sub(self.position))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!(
                    destination = %self.destination,
                    error = %e,
                    "Failed to flush write channel on close"
                );
            }
        }

        self.reader.take();

        if let Some(descriptor) = self.descriptor.take() {
            if let Err(e) = descriptor.release() {
                tracing::warn!(
                    destination = %self.destination,
                    error = %e,
                    "Failed to release descriptor on close"
                );
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.writer.is_none()
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
