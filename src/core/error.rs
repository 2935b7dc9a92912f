// This module defines the error types for litmusgen using the thiserror crate. EncodeError
// covers encoder contract violations: a raw operand size outside {1, 2, 4, 8} reaching an
// instruction family, or an append that would run past the hard end of a code buffer.
// Both indicate a generator defect rather than a runtime condition, so each maps to a
// distinct small negative process status through exit_code(), and abort_on_encode_error
// is the single place that turns one into process termination. RegionError reports
// mmap/munmap failures for the code, data and communication regions, and task layouts
// whose total length would not fit in the address space. HarnessError wraps
// everything the coordinating process can hit: invalid configuration, region acquisition,
// and fork/waitpid failures for a specific task.

//! Error types for litmusgen.

use std::io;

use thiserror::Error;

use crate::core::region::RegionKind;
use crate::x64::Family;

/// Encoder contract violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unsupported operand size {size} for {family}")]
    UnsupportedSize { family: Family, size: u8 },

    #[error("code buffer full: {needed} bytes needed, {remaining} remaining")]
    BufferFull { needed: usize, remaining: usize },
}

impl EncodeError {
    /// Process status used when this error terminates a task.
    pub fn exit_code(&self) -> i32 {
        match self {
            EncodeError::UnsupportedSize { family, .. } => match family {
                Family::MovRegReg => -1,
                Family::MovImmReg => -2,
                Family::MovRegMem => -3,
                Family::Xadd => -4,
                Family::Xchg => -5,
                Family::MovMemReg => -6,
                // Fences take no size.
                Family::Mfence | Family::Lfence | Family::Sfence => -8,
            },
            EncodeError::BufferFull { .. } => -7,
        }
    }
}

/// Result type alias for encoder operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Terminates the calling process after an encoder contract violation.
///
/// Continuing would leave corrupt machine code in executable memory, so there is no
/// recovery path. Uses `_exit` so that a forked task never unwinds into state it
/// inherited from the coordinating process.
pub fn abort_on_encode_error(err: EncodeError) -> ! {
    log::error!("encoder contract violation: {err}");
    // SAFETY: `_exit` has no preconditions and never returns.
    unsafe { libc::_exit(err.exit_code()) }
}

/// Memory region mapping failures.
#[derive(Error, Debug)]
pub enum RegionError {
    #[error("failed to map {kind} region ({len} bytes): {source}")]
    Map {
        kind: RegionKind,
        len: usize,
        #[source]
        source: io::Error,
    },

    #[error("{kind} region layout overflows: {tasks} tasks of {task_size} bytes")]
    Layout { kind: RegionKind, task_size: usize, tasks: usize },

    #[error("failed to unmap {kind} region ({len} bytes): {source}")]
    Unmap {
        kind: RegionKind,
        len: usize,
        #[source]
        source: io::Error,
    },
}

/// Result type alias for region operations.
pub type RegionResult<T> = Result<T, RegionError>;

/// Failures seen by the coordinating process.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("failed to spawn task {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to join task {index} (pid {pid}): {source}")]
    Join {
        index: usize,
        pid: i32,
        #[source]
        source: io::Error,
    },
}

/// Result type alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_family() {
        let families = [
            Family::MovRegReg,
            Family::MovImmReg,
            Family::MovRegMem,
            Family::MovMemReg,
            Family::Xadd,
            Family::Xchg,
        ];
        let mut codes: Vec<i32> = families
            .iter()
            .map(|&family| EncodeError::UnsupportedSize { family, size: 3 }.exit_code())
            .collect();
        codes.push(EncodeError::BufferFull { needed: 1, remaining: 0 }.exit_code());

        assert!(codes.iter().all(|&c| c < 0));
        let mut deduped = codes.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), codes.len());
    }

    /// Run `abort_on_encode_error` in a forked child and return the status its parent sees.
    fn status_after_abort(err: EncodeError) -> i32 {
        // SAFETY: the child only calls `abort_on_encode_error`, which never returns.
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed: {}", io::Error::last_os_error());
        if pid == 0 {
            abort_on_encode_error(err);
        }
        let mut status = 0;
        // SAFETY: pid is our own child and status is a valid out-pointer.
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        assert_eq!(rc, pid);
        status
    }

    #[test]
    fn abort_exits_with_family_status() {
        let status =
            status_after_abort(EncodeError::UnsupportedSize { family: Family::Xchg, size: 3 });
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), (-5i32) as u8 as i32);

        let status = status_after_abort(EncodeError::BufferFull { needed: 10, remaining: 2 });
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), (-7i32) as u8 as i32);
    }

    #[test]
    fn unsupported_size_message_names_family() {
        let err = EncodeError::UnsupportedSize { family: Family::Xchg, size: 3 };
        assert_eq!(err.to_string(), "unsupported operand size 3 for xchg");
    }
}
