//! Raw `pthread_mutex_t` FFI: a process-shared, robust, non-recursive mutex.
//!
//! This is the OS primitive C3 builds on. POSIX does not portably support
//! combining `PTHREAD_MUTEX_ROBUST` with `PTHREAD_MUTEX_RECURSIVE`, so the
//! mutex created here is always the default (non-recursive, non-errorcheck)
//! type; [`crate::robust_lock`] emulates recursion on top of it.

use std::io;
use std::mem::MaybeUninit;
use std::time::Duration;

/// Outcome of a single attempt to lock the raw primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawLockOutcome {
    /// Acquired cleanly; the caller is now the OS-level owner.
    Acquired,
    /// A previous owner died while holding the lock. The caller is now the
    /// owner, but the mutex's internal state is "inconsistent" until
    /// [`make_consistent`] is called.
    OwnerDied,
    /// Could not be acquired within the requested bound.
    WouldBlock,
}

/// Initialize a `pthread_mutex_t` in place at `ptr`, process-shared and
/// robust. `ptr` must point at valid, writable memory for the lifetime of
/// the mutex (the mmap'd region backing the mutex's shared file).
///
/// # Safety
/// `ptr` must be non-null, properly aligned, and valid for writes of
/// `size_of::<libc::pthread_mutex_t>()` bytes, and must not already hold an
/// initialized mutex.
pub(crate) unsafe fn init_process_shared_robust(
    ptr: *mut libc::pthread_mutex_t,
) -> io::Result<()> {
    unsafe {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
        let mut attr = attr.assume_init();

        let result = (|| -> io::Result<()> {
            check(libc::pthread_mutexattr_setpshared(
                &mut attr,
                libc::PTHREAD_PROCESS_SHARED,
            ))?;
            check(libc::pthread_mutexattr_setrobust(
                &mut attr,
                libc::PTHREAD_MUTEX_ROBUST,
            ))?;
            check(libc::pthread_mutex_init(ptr, &attr))?;
            Ok(())
        })();

        libc::pthread_mutexattr_destroy(&mut attr);
        result
    }
}

/// Destroy a previously-initialized mutex at `ptr`.
///
/// # Safety
/// `ptr` must point at a mutex initialized by [`init_process_shared_robust`]
/// that is not currently locked by any thread.
pub(crate) unsafe fn destroy(ptr: *mut libc::pthread_mutex_t) {
    unsafe {
        // Best-effort: a file being unlinked while locked by a dead owner is
        // not something we can recover from here; ignore the result.
        let _ = libc::pthread_mutex_destroy(ptr);
    }
}

/// Non-blocking attempt to lock.
///
/// # Safety
/// `ptr` must point at a live, initialized robust mutex.
pub(crate) unsafe fn try_lock(ptr: *mut libc::pthread_mutex_t) -> io::Result<RawLockOutcome> {
    unsafe { interpret_lock_result(libc::pthread_mutex_trylock(ptr), ptr) }
}

/// Blocks until `deadline` (relative to now) or the mutex is acquired.
///
/// # Safety
/// Same as [`try_lock`].
pub(crate) unsafe fn timed_lock(
    ptr: *mut libc::pthread_mutex_t,
    timeout: Duration,
) -> io::Result<RawLockOutcome> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // pthread_mutex_timedlock is specified against CLOCK_REALTIME.
    unsafe {
        if libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    let secs = timeout.as_secs() as i64;
    let nanos = i64::from(timeout.subsec_nanos());
    ts.tv_sec = ts.tv_sec.saturating_add(secs);
    ts.tv_nsec += nanos;
    if ts.tv_nsec >= 1_000_000_000 {
        ts.tv_nsec -= 1_000_000_000;
        ts.tv_sec += 1;
    }
    unsafe { interpret_lock_result(libc::pthread_mutex_timedlock(ptr, &ts), ptr) }
}

/// Blocks indefinitely (the `INFINITE` timeout case).
///
/// # Safety
/// Same as [`try_lock`].
pub(crate) unsafe fn lock(ptr: *mut libc::pthread_mutex_t) -> io::Result<RawLockOutcome> {
    unsafe { interpret_lock_result(libc::pthread_mutex_lock(ptr), ptr) }
}

unsafe fn interpret_lock_result(
    rc: i32,
    _ptr: *mut libc::pthread_mutex_t,
) -> io::Result<RawLockOutcome> {
    match rc {
        0 => Ok(RawLockOutcome::Acquired),
        libc::EOWNERDEAD => Ok(RawLockOutcome::OwnerDied),
        libc::EBUSY | libc::ETIMEDOUT => Ok(RawLockOutcome::WouldBlock),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}

/// Must be called after observing [`RawLockOutcome::OwnerDied`] before the
/// mutex can be unlocked normally again.
///
/// # Safety
/// `ptr` must point at a live mutex currently held (inconsistently) by the
/// calling thread.
pub(crate) unsafe fn make_consistent(ptr: *mut libc::pthread_mutex_t) -> io::Result<()> {
    unsafe { check(libc::pthread_mutex_consistent(ptr)) }
}

/// Unlocks a mutex held by the calling thread.
///
/// # Safety
/// `ptr` must point at a live mutex locked by the calling thread.
pub(crate) unsafe fn unlock(ptr: *mut libc::pthread_mutex_t) -> io::Result<()> {
    unsafe { check(libc::pthread_mutex_unlock(ptr)) }
}

fn check(rc: i32) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}
