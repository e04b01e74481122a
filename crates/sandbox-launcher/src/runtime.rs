//! Process preflight checks.
//!
//! `landlock_restrict_self` only confines the calling thread, so any sibling
//! thread alive at enforcement time would keep running unrestricted.

use std::fs;
use std::io;

use crate::error::SandboxError;

/// Returns the number of threads in the current process.
///
/// # Errors
///
/// Returns an IO error when `/proc/self/status` cannot be read or lacks a
/// well-formed `Threads:` line.
pub fn thread_count() -> io::Result<usize> {
    let status = fs::read_to_string("/proc/self/status")?;
    parse_thread_count(&status)
}

fn parse_thread_count(status: &str) -> io::Result<usize> {
    let (_, tail) = status
        .split_once("Threads:")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing thread count"))?;
    let count = tail
        .split_whitespace()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed thread count"))?;
    count
        .parse::<usize>()
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

/// Fails unless the current process runs a single thread.
///
/// # Errors
///
/// Returns [`SandboxError::MultiThreaded`] when other threads exist and
/// [`SandboxError::ThreadCountUnavailable`] when the count cannot be read.
pub fn ensure_single_threaded() -> Result<(), SandboxError> {
    let threads =
        thread_count().map_err(|source| SandboxError::ThreadCountUnavailable { source })?;
    if threads > 1 {
        return Err(SandboxError::MultiThreaded {
            thread_count: threads,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_threads_line() {
        let status = "Name:\tsandbox\nThreads:\t3\nSigQ:\t0/1\n";
        assert_eq!(parse_thread_count(status).ok(), Some(3));
    }

    #[test]
    fn missing_threads_line_is_invalid_data() {
        let error = parse_thread_count("Name:\tsandbox\n").err();
        assert_eq!(error.map(|e| e.kind()), Some(io::ErrorKind::InvalidData));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reports_at_least_the_current_thread() {
        let threads = thread_count().unwrap_or_default();
        assert!(threads >= 1);
    }
}
