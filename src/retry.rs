//! Retry logic with exponential backoff
//!
//! [`RetryPolicy`] is a ready-made [`WriteErrorHandle`] for the writer: it
//! retries transient storage failures with exponential backoff and optional
//! jitter, and gives up on permanent ones.
//!
//! # Example
//!
//! ```no_run
//! use segwrite::{CircularWriter, Destination};
//! use segwrite::boundary::Unrestricted;
//! use segwrite::config::RetryConfig;
//! use segwrite::retry::RetryPolicy;
//!
//! # fn example() -> segwrite::Result<()> {
//! let destination = Destination::open_local("archive.bin")?;
//! let mut writer = CircularWriter::new(destination, "archive.bin.spill", Unrestricted)?;
//! writer.set_write_error_handle(RetryPolicy::new(RetryConfig::default()));
//! # Ok(())
//! # }
//! ```

use crate::callbacks::WriteErrorHandle;
use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, interrupted calls, a storage device that is
/// momentarily busy) should return `true`. Permanent failures (disk full,
/// permission denied, protocol violations) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ResourceBusy
            ),
            // spill file creation happens once, before any data moved
            Error::SpillFile { .. } => false,
            Error::InvalidRange { .. }
            | Error::SourceTooShort { .. }
            | Error::BoundaryRetreated { .. }
            | Error::SeekOutOfRange { .. } => false,
            Error::Unsupported(_) | Error::Closed => false,
        }
    }
}

/// Blocking retry policy for failed storage writes.
///
/// The writer calls [`handle`](WriteErrorHandle::handle) from its own thread,
/// so the backoff sleeps that thread. The attempt counter starts over once a
/// write goes through.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy from `config`.
    pub fn new(config: RetryConfig) -> Self {
        let delay = config.initial_delay;
        Self {
            config,
            attempt: 0,
            delay,
        }
    }

    /// Retries used for the write currently failing.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Forgets previous failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.delay = self.config.initial_delay;
    }
}

impl WriteErrorHandle for RetryPolicy {
    fn handle(&mut self, err: &Error) -> bool {
        if !err.is_retryable() {
            tracing::error!(error = %err, "Storage write failed with non-retryable error");
            return false;
        }

        if self.attempt >= self.config.max_attempts {
            tracing::error!(
                error = %err,
                attempts = self.attempt + 1,
                "Storage write failed after all retry attempts exhausted"
            );
            self.reset();
            return false;
        }

        self.attempt += 1;
        tracing::warn!(
            error = %err,
            attempt = self.attempt,
            max_attempts = self.config.max_attempts,
            delay_ms = self.delay.as_millis(),
            "Storage write failed, retrying"
        );

        let wait = if self.config.jitter {
            add_jitter(self.delay)
        } else {
            self.delay
        };
        std::thread::sleep(wait);

        let next = Duration::from_secs_f64(self.delay.as_secs_f64() * self.config.backoff_multiplier);
        self.delay = next.min(self.config.max_delay);
        true
    }

    fn recovered(&mut self) {
        if self.attempt > 0 {
            tracing::info!(attempts = self.attempt + 1, "Storage write succeeded after retry");
        }
        self.reset();
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
