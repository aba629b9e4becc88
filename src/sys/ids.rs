//! Thread/process identity helpers.
//!
//! The owner field embedded in [`crate::robust_lock::LockBody`] is read by
//! other processes through the shared mapping, so it must be a
//! process-unique, address-space-unique id — `std::thread::ThreadId` has no
//! meaning outside the process that minted it, unlike a kernel thread id.

/// Current thread's kernel id (`gettid(2)`), guaranteed non-zero.
#[cfg(target_os = "linux")]
pub(crate) fn current_tid() -> i32 {
    // SAFETY: SYS_gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn current_tid() -> i32 {
    // Other unixes (e.g. BSD, macOS) have no portable gettid(); pthread_self
    // is an opaque handle but it is unique per-thread within this process,
    // which is all `current_tid` needs to compare against a stored owner.
    unsafe { libc::pthread_self() as i32 }
}

/// Effective user id of this process, used to pick the user-scope directory.
pub(crate) fn effective_uid() -> u32 {
    nix::unistd::Uid::effective().as_raw()
}

/// Session id used for session-scope directory placement.
pub(crate) fn session_id() -> u32 {
    nix::unistd::getsid(None)
        .map(|p| p.as_raw() as u32)
        .unwrap_or(0)
}
