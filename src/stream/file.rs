use crate::error::{Error, Result};
use crate::stream::Stream;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// [`Stream`] over a local file opened read-write.
///
/// Every operation maps onto the matching [`std::fs::File`] call; failures
/// propagate immediately.
#[derive(Debug)]
pub struct FileStream {
    file: Option<File>,
}

impl FileStream {
    /// Opens `path` for reading and writing, creating it if absent.
    ///
    /// Existing content is kept.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::from_file(file))
    }

    /// Wraps an already opened file.
    pub fn from_file(file: File) -> Self {
        Self { file: Some(file) }
    }

    /// Current absolute position.
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.file()?.stream_position()?)
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::Closed)
    }

    fn file_ref(&self) -> Result<&File> {
        self.file.as_ref().ok_or(Error::Closed)
    }
}

impl Stream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file()?.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file()?.write_all(buf)?;
        Ok(())
    }

    fn skip(&mut self, amount: u64) -> Result<u64> {
        let file = self.file()?;
        let position = file.stream_position()?;
        let length = file.metadata()?.len();
        let skipped = amount.min(length.saturating_sub(position));
        file.seek(SeekFrom::Start(position + skipped))?;
        Ok(skipped)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn length(&self) -> Result<u64> {
        Ok(self.file_ref()?.metadata()?.len())
    }

    fn set_length(&mut self, length: u64) -> Result<()> {
        self.file()?.set_len(length)?;
        Ok(())
    }

    fn available(&mut self) -> Result<u64> {
        let file = self.file()?;
        let position = file.stream_position()?;
        Ok(file.metadata()?.len().saturating_sub(position))
    }

    fn flush(&mut self) -> Result<()> {
        self.file()?.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::trace!("closed file stream");
        }
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
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
