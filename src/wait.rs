//! Wait engine (C5).
//!
//! Translates the robust-lock layer's [`LockOutcome`] into the public wait
//! result vocabulary, and stands in for the multi-object wait that a real
//! Win32-style wait API would expose alongside a named mutex.

use std::time::Duration;

use crate::error::{MutexError, Result};
use crate::registry::Handle;
use crate::robust_lock::LockOutcome;

/// Outcome of waiting on a single [`crate::MutexHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Acquired; no previous owner abandoned it.
    Signaled,
    /// Acquired; the previous owner died or closed its handle without
    /// releasing. The caller now owns the mutex.
    Abandoned,
    /// The timeout elapsed without acquiring the mutex.
    TimedOut,
}

impl From<LockOutcome> for WaitResult {
    fn from(outcome: LockOutcome) -> Self {
        match outcome {
            LockOutcome::Acquired => WaitResult::Signaled,
            LockOutcome::Abandoned => WaitResult::Abandoned,
            LockOutcome::TimedOut => WaitResult::TimedOut,
        }
    }
}

/// Waits on `handle`, blocking up to `timeout` (`None` = forever).
pub(crate) fn wait_one(handle: &Handle, timeout: Option<Duration>) -> Result<WaitResult> {
    let outcome = crate::registry::wait(handle, timeout)?;
    Ok(outcome.into())
}

/// Stand-in for a multi-object wait over a set including named mutexes.
///
/// Unlike an event or a semaphore, a named mutex carries thread-affine
/// ownership (recursion, `NOT_OWNER` on release); a wait-any/wait-all over a
/// mixed set of such handles can't be expressed as a single atomic operation
/// without risking ownership being attributed to the wrong synchronization
/// context. Rather than approximate it, this is refused outright (§4.5) — no
/// handle's state is touched.
pub(crate) fn wait_multiple(_handles: &[&Handle], _wait_all: bool, _timeout: Option<Duration>) -> Result<WaitResult> {
    Err(MutexError::NotSupported)
}
