//! Workspaces, brokers and content generators

use segwrite::{CircularWriter, Descriptor, Destination, OffsetChecker, StorageBroker, WriterConfig};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Destination file name used by every workspace
pub const DESTINATION: &str = "download.bin";

/// Spill file name used by every workspace
pub const SPILL: &str = "download.bin.spill";

/// A temporary directory holding one destination and its spill file
pub struct Workspace {
    /// Keeps the directory alive for the duration of the test
    pub dir: TempDir,
}

impl Workspace {
    /// Creates an empty workspace
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Path of the destination file
    pub fn destination(&self) -> PathBuf {
        self.dir.path().join(DESTINATION)
    }

    /// Path of the spill file
    pub fn spill(&self) -> PathBuf {
        self.dir.path().join(SPILL)
    }

    /// Opens a writer over a local destination
    pub fn writer(
        &self,
        checker: impl OffsetChecker + Send + 'static,
        config: WriterConfig,
    ) -> CircularWriter<Destination> {
        let destination =
            Destination::open_local(self.destination()).expect("Failed to open destination");
        CircularWriter::with_config(destination, self.spill(), checker, config)
            .expect("Failed to create writer")
    }

    /// Reads the destination back
    pub fn contents(&self) -> Vec<u8> {
        std::fs::read(self.destination()).expect("Failed to read destination")
    }
}

/// Writer settings small enough to exercise queue flushes and drains with
/// a few hundred bytes
pub fn tiny_config() -> WriterConfig {
    WriterConfig {
        queue_buffer_size: 32,
        copy_buffer_size: 48,
        notify_interval: 100,
        drain_threshold: 256,
        spill_residual: 0,
        keep_spill_file: false,
    }
}

/// Deterministic, non-repeating-looking content of `len` bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8)
        .collect()
}

/// Splits `len` bytes into `parts` contiguous ranges of near-equal size
pub fn split_ranges(len: u64, parts: u64) -> Vec<(u64, u64)> {
    let step = len.div_ceil(parts);
    (0..parts)
        .map(|i| (i * step, ((i + 1) * step).min(len)))
        .filter(|(start, end)| start < end)
        .collect()
}

/// Broker serving files from a directory, like a platform content provider
pub struct DirBroker {
    /// Directory the identifiers are resolved against
    pub root: PathBuf,
}

impl DirBroker {
    /// Creates a broker rooted at `root`
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl StorageBroker for DirBroker {
    fn open_descriptor(&self, destination: &str) -> segwrite::Result<Box<dyn Descriptor>> {
        let file: File = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.root.join(destination))?;
        Ok(Box::new(file))
    }
}
