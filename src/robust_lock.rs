//! The robust lock primitive (C3).
//!
//! A thin, safe-ish wrapper around the raw `pthread_mutex_t` in
//! [`crate::header::LockBody`] that adds the two things POSIX doesn't give
//! us for free: recursion, and abandonment-on-graceful-close (as opposed to
//! only abandonment-on-death, which the robust mutex already provides).

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use crate::header::LockBody;
use crate::sys::{ids, pthread};
use crate::sys::pthread::RawLockOutcome;

/// Result of an acquire attempt, after this layer's recursion and
/// explicit-abandonment handling has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockOutcome {
    /// Acquired; the caller is the owner (possibly recursively).
    Acquired,
    /// Acquired, but the previous owner ceased to exist (or explicitly
    /// abandoned, see [`RobustLock::mark_abandoned_and_unlock`]) while
    /// holding it. The caller is now the owner at depth 1.
    Abandoned,
    /// Not acquired within the requested bound.
    TimedOut,
}

/// Non-owning handle to a [`LockBody`] living in mapped shared memory.
///
/// `Send`/`Sync`: a `pthread_mutex_t` configured `PTHREAD_PROCESS_SHARED` is
/// explicitly designed to be operated on by any thread in any process that
/// maps it; the bookkeeping fields are plain atomics.
#[derive(Clone, Copy)]
pub(crate) struct RobustLock {
    body: *mut LockBody,
}

unsafe impl Send for RobustLock {}
unsafe impl Sync for RobustLock {}

impl RobustLock {
    /// Wrap an already-initialized [`LockBody`].
    ///
    /// # Safety
    /// `body` must point at a `LockBody` that has been initialized by
    /// [`RobustLock::init_in_place`] (possibly by another process) and that
    /// outlives this `RobustLock`.
    pub(crate) unsafe fn from_raw(body: *mut LockBody) -> Self {
        RobustLock { body }
    }

    unsafe fn mutex_ptr(&self) -> *mut libc::pthread_mutex_t {
        unsafe { ptr::addr_of_mut!((*self.body).raw) }
    }

    unsafe fn depth(&self) -> &AtomicU32 {
        unsafe { &*ptr::addr_of!((*self.body).depth) }
    }

    unsafe fn owner_tid(&self) -> &AtomicI32 {
        unsafe { &*ptr::addr_of!((*self.body).owner_tid) }
    }

    unsafe fn abandon_flag(&self) -> &AtomicU8 {
        unsafe { &*ptr::addr_of!((*self.body).abandon_flag) }
    }

    /// Initializes a freshly-mapped, zeroed `LockBody` in place. Must be
    /// called exactly once, by the process creating the backing file,
    /// before any other process observes the mapping (C2 holds the C6
    /// advisory lock across this call to close that window).
    ///
    /// # Safety
    /// `body` must point at writable memory of at least
    /// `size_of::<LockBody>()` bytes that no other thread/process is yet
    /// using as a `LockBody`.
    pub(crate) unsafe fn init_in_place(
        body: *mut LockBody,
        initially_owned: bool,
    ) -> io::Result<()> {
        unsafe {
            ptr::addr_of_mut!((*body).depth).write(AtomicU32::new(0));
            ptr::addr_of_mut!((*body).owner_tid).write(AtomicI32::new(0));
            ptr::addr_of_mut!((*body).abandon_flag).write(AtomicU8::new(0));
            pthread::init_process_shared_robust(ptr::addr_of_mut!((*body).raw))?;
        }
        if initially_owned {
            let lock = unsafe { RobustLock::from_raw(body) };
            match lock.try_acquire()? {
                LockOutcome::Acquired => {}
                other => {
                    return Err(io::Error::other(format!(
                        "unexpected outcome initializing an initially-owned mutex: {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Tears down the OS mutex. Only valid once no process holds a
    /// reference (C6 guarantees this by serializing on its advisory lock).
    ///
    /// # Safety
    /// No thread anywhere may be holding or waiting on the lock.
    pub(crate) unsafe fn destroy_in_place(body: *mut LockBody) {
        unsafe { pthread::destroy(ptr::addr_of_mut!((*body).raw)) }
    }

    /// Whether the calling thread currently owns the lock, per the shared
    /// `owner_tid`/`depth` state. Derived straight from shared memory, so it
    /// gives the same answer regardless of which process-local `SharedRef`
    /// (and thus which mapping) is used to ask — unlike any bookkeeping
    /// keyed by a particular mapping's address, which a close-to-zero and
    /// reopen of the same identity would leave behind.
    pub(crate) fn is_current_owner(&self) -> bool {
        let tid = ids::current_tid();
        unsafe { self.owner_tid().load(Ordering::Acquire) == tid && self.depth().load(Ordering::Acquire) > 0 }
    }

    /// Increments the recursion depth for a same-thread recursive acquire.
    /// Fails rather than wrapping `u32::MAX` back to 0, which would leave
    /// the lock held at a depth of zero (I2/I3) and never unlock.
    ///
    /// # Safety
    /// Caller must hold the lock already (i.e. `is_current_owner()` is true).
    unsafe fn bump_depth_or_fail(&self) -> io::Result<()> {
        let depth = unsafe { self.depth() };
        if depth.load(Ordering::Acquire) == u32::MAX {
            return Err(io::Error::other("recursive acquire depth overflow"));
        }
        depth.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// `ms == 0` semantics: never blocks.
    pub(crate) fn try_acquire(&self) -> io::Result<LockOutcome> {
        if self.is_current_owner() {
            unsafe { self.bump_depth_or_fail()? };
            return Ok(LockOutcome::Acquired);
        }
        let raw = unsafe { pthread::try_lock(self.mutex_ptr())? };
        self.finish_acquire(raw)
    }

    /// `timeout = None` is `INFINITE`; `Some(Duration::ZERO)` behaves like
    /// [`RobustLock::try_acquire`].
    pub(crate) fn timed_acquire(&self, timeout: Option<Duration>) -> io::Result<LockOutcome> {
        if self.is_current_owner() {
            unsafe { self.bump_depth_or_fail()? };
            return Ok(LockOutcome::Acquired);
        }
        let raw = match timeout {
            Some(d) if d.is_zero() => unsafe { pthread::try_lock(self.mutex_ptr())? },
            Some(d) => unsafe { pthread::timed_lock(self.mutex_ptr(), d)? },
            None => unsafe { pthread::lock(self.mutex_ptr())? },
        };
        self.finish_acquire(raw)
    }

    fn finish_acquire(&self, raw: RawLockOutcome) -> io::Result<LockOutcome> {
        match raw {
            RawLockOutcome::WouldBlock => Ok(LockOutcome::TimedOut),
            RawLockOutcome::OwnerDied => {
                unsafe {
                    pthread::make_consistent(self.mutex_ptr())?;
                    self.abandon_flag().store(0, Ordering::Release);
                    self.owner_tid().store(ids::current_tid(), Ordering::Release);
                    self.depth().store(1, Ordering::Release);
                }
                Ok(LockOutcome::Abandoned)
            }
            RawLockOutcome::Acquired => {
                let was_explicitly_abandoned =
                    unsafe { self.abandon_flag().swap(0, Ordering::AcqRel) } != 0;
                unsafe {
                    self.owner_tid().store(ids::current_tid(), Ordering::Release);
                    self.depth().store(1, Ordering::Release);
                }
                Ok(if was_explicitly_abandoned {
                    LockOutcome::Abandoned
                } else {
                    LockOutcome::Acquired
                })
            }
        }
    }

    /// Releases one level of recursion. `Ok(false)` means the caller does
    /// not own the lock (I4): state is left unchanged.
    pub(crate) fn release(&self) -> io::Result<bool> {
        if !self.is_current_owner() {
            return Ok(false);
        }
        let remaining = unsafe { self.depth().fetch_sub(1, Ordering::AcqRel) } - 1;
        if remaining == 0 {
            unsafe {
                self.owner_tid().store(0, Ordering::Release);
                pthread::unlock(self.mutex_ptr())?;
            }
        }
        Ok(true)
    }

    /// Forces the lock into the abandoned state and unlocks it
    /// unconditionally, regardless of current depth. Used only by
    /// [`crate::registry`] when the last handle referencing a reference is
    /// closed while the calling thread still owns the lock (§4.3/§4.4).
    pub(crate) fn mark_abandoned_and_unlock(&self) -> io::Result<()> {
        unsafe {
            self.abandon_flag().store(1, Ordering::Release);
            self.owner_tid().store(0, Ordering::Release);
            self.depth().store(0, Ordering::Release);
            pthread::unlock(self.mutex_ptr())
        }
    }

    #[cfg(test)]
    pub(crate) fn depth_for_test(&self) -> u32 {
        unsafe { self.depth().load(Ordering::Acquire) }
    }

    #[cfg(test)]
    pub(crate) fn set_depth_for_test(&self, depth: u32) {
        unsafe { self.depth().store(depth, Ordering::Release) };
    }
}
