//! Callback contracts consumed by the writer and the chunk reader

use crate::error::Error;

/// Receives coarse-grained progress, as an absolute byte count.
///
/// Invoked at most once per notify interval, never per call.
pub trait ProgressReport {
    /// Reports the number of bytes committed (or read) so far.
    fn report(&mut self, progress: u64);
}

impl<F> ProgressReport for F
where
    F: FnMut(u64),
{
    fn report(&mut self, progress: u64) {
        self(progress)
    }
}

/// Decides whether a failed storage write is retried.
pub trait WriteErrorHandle {
    /// Attempts to handle an I/O failure.
    ///
    /// Returns `true` to retry the same write, `false` to propagate `err`.
    fn handle(&mut self, err: &Error) -> bool;

    /// Called once a write that needed at least one retry went through.
    fn recovered(&mut self) {}
}

impl<F> WriteErrorHandle for F
where
    F: FnMut(&Error) -> bool,
{
    fn handle(&mut self, err: &Error) -> bool {
        self(err)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_progress_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |p: u64| seen.push(p);
            sink.report(10);
            sink.report(20);
        }
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn closures_are_write_error_handles() {
        let mut calls = 0;
        let mut handle = |_: &Error| {
            calls += 1;
            calls < 2
        };

        let err = Error::Closed;
        assert!(handle.handle(&err));
        assert!(!handle.handle(&err));
        handle.recovered();
    }
}
