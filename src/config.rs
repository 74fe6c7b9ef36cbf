//! Configuration types for segwrite

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Buffering and reconciliation settings for [`CircularWriter`](crate::CircularWriter)
///
/// The defaults suit multi-megabyte downloads on local storage; tests shrink
/// `drain_threshold` to exercise draining without writing 15 MiB.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Size of the in-memory write queue in front of each stream (default: 8 KiB)
    #[serde(default = "default_queue_buffer_size")]
    pub queue_buffer_size: usize,

    /// Size of the bulk buffer used to move bytes from the spill file (default: 128 KiB)
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,

    /// Minimum distance between two progress reports in bytes (default: 64 KiB)
    #[serde(default = "default_notify_interval")]
    pub notify_interval: u64,

    /// Spill length that triggers an opportunistic drain (default: 15 MiB)
    ///
    /// Smaller values drain more often at the cost of more, smaller copies.
    #[serde(default = "default_drain_threshold")]
    pub drain_threshold: u64,

    /// Size the spill file is truncated to once fully drained (default: 15 MiB)
    ///
    /// Keeping some allocated space avoids growing the file from zero on
    /// every spill.
    #[serde(default = "default_spill_residual")]
    pub spill_residual: u64,

    /// Keep the spill file on disk after the writer is closed (default: false)
    #[serde(default)]
    pub keep_spill_file: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_buffer_size: default_queue_buffer_size(),
            copy_buffer_size: default_copy_buffer_size(),
            notify_interval: default_notify_interval(),
            drain_threshold: default_drain_threshold(),
            spill_residual: default_spill_residual(),
            keep_spill_file: false,
        }
    }
}

/// Settings for [`ChunkReader`](crate::ChunkReader)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Bytes read between two progress reports (default: 256 KiB)
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            report_interval: default_report_interval(),
        }
    }
}

/// Retry configuration for failed storage writes
///
/// Used by [`RetryPolicy`](crate::retry::RetryPolicy).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_queue_buffer_size() -> usize {
    8 * 1024 // 8 KiB
}

fn default_copy_buffer_size() -> usize {
    128 * 1024 // 128 KiB
}

fn default_notify_interval() -> u64 {
    64 * 1024 // 64 KiB
}

fn default_drain_threshold() -> u64 {
    15 * 1024 * 1024 // 15 MiB
}

fn default_spill_residual() -> u64 {
    15 * 1024 * 1024 // 15 MiB
}

fn default_report_interval() -> u64 {
    256 * 1024 // 256 KiB
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
