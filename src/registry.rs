//! Handle / reference registry (C4).
//!
//! A single process-wide table mapping [`Identity`] to a shared reference,
//! guarded by a `parking_lot::Mutex` (see §9's "initialize-once service"
//! guidance). Per-thread lock-ownership bookkeeping is kept separately in a
//! `thread_local!`, exactly as spec.md §5 requires: "Thread-local
//! lock-ownership state is owned exclusively by each thread and requires no
//! synchronization."

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{MutexError, Result};
use crate::lifetime::SharedRef;
use crate::name::Identity;
use crate::robust_lock::LockOutcome;

/// Opaque per-process handle identifier. Never reused while the process is
/// running (monotonic counter), so stale thread-local bookkeeping can never
/// be misattributed to a newer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_handle_id() -> HandleId {
    HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
}

type Registry = Mutex<HashMap<Identity, Arc<SharedRef>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

thread_local! {
    /// Per shared-reference (keyed by its allocation address), how many
    /// outstanding acquires *this thread* holds through *any* handle
    /// sharing that reference. Consulted on `release` (I4) and on
    /// handle-close (§4.3/§4.4's close-while-held abandonment).
    static OWNED: RefCell<HashMap<usize, u32>> = RefCell::new(HashMap::new());
}

fn shared_key(shared: &Arc<SharedRef>) -> usize {
    Arc::as_ptr(shared) as usize
}

/// A caller-visible handle to an open mutex reference.
pub struct Handle {
    pub(crate) id: HandleId,
    pub(crate) shared: Arc<SharedRef>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("identity", &self.shared.identity)
            .finish()
    }
}

/// `Create(name, user_scope, initially_owned)`. Returns the handle and
/// whether an existing identity was reused (`ALREADY_EXISTS`, informational
/// per §7).
pub(crate) fn create(
    identity: Identity,
    initially_owned: bool,
    config: &Config,
) -> Result<(Handle, bool)> {
    // Unnamed mutexes are never deduplicated (spec §4.1): always a fresh
    // SharedRef, never touching the identity map.
    if matches!(identity, Identity::Unnamed) {
        let shared = Arc::new(SharedRef::create_unnamed(initially_owned)?);
        return Ok((
            Handle {
                id: next_handle_id(),
                shared,
            },
            false,
        ));
    }

    let mut table = registry().lock();
    if let Some(existing) = table.get(&identity) {
        existing.refcount.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(existing);
        drop(table);
        return Ok((
            Handle {
                id: next_handle_id(),
                shared,
            },
            true,
        ));
    }

    // Nothing live in *this* process, but another process may already own
    // the backing file; `open_or_create` transparently opens it if so.
    let (shared_ref, created_on_disk) =
        SharedRef::open_or_create(identity.clone(), initially_owned, config, false)?;
    let shared = Arc::new(shared_ref);
    table.insert(identity, Arc::clone(&shared));
    drop(table);

    Ok((
        Handle {
            id: next_handle_id(),
            shared,
        },
        !created_on_disk,
    ))
}

/// `Open(name, user_scope)`. Fails with `FILE_NOT_FOUND` if no live
/// reference is visible, in this process or on disk.
pub(crate) fn open(identity: Identity, config: &Config) -> Result<Handle> {
    if matches!(identity, Identity::Unnamed) {
        return Err(MutexError::FileNotFound);
    }

    let mut table = registry().lock();
    if let Some(existing) = table.get(&identity) {
        existing.refcount.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(existing);
        drop(table);
        return Ok(Handle {
            id: next_handle_id(),
            shared,
        });
    }

    let (shared_ref, _created) =
        SharedRef::open_or_create(identity.clone(), false, config, true)?;
    let shared = Arc::new(shared_ref);
    table.insert(identity, Arc::clone(&shared));
    drop(table);

    Ok(Handle {
        id: next_handle_id(),
        shared,
    })
}

/// `Wait(handle, timeout)`. On success, records this thread's acquisition
/// in thread-local state (I1–I3).
pub(crate) fn wait(handle: &Handle, timeout: Option<Duration>) -> std::io::Result<LockOutcome> {
    let outcome = handle.shared.lock().timed_acquire(timeout)?;
    if !matches!(outcome, LockOutcome::TimedOut) {
        let key = shared_key(&handle.shared);
        OWNED.with(|o| *o.borrow_mut().entry(key).or_insert(0) += 1);
    }
    Ok(outcome)
}

/// `Release(handle)`. `Ok(false)` means the calling thread does not own the
/// mutex (`NOT_OWNER`); state is left unchanged (I4).
pub(crate) fn release(handle: &Handle) -> std::io::Result<bool> {
    let key = shared_key(&handle.shared);
    let owns = OWNED.with(|o| {
        let mut map = o.borrow_mut();
        match map.get_mut(&key) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    map.remove(&key);
                }
                true
            }
            _ => false,
        }
    });
    if !owns {
        return Ok(false);
    }
    handle.shared.lock().release()
}

/// `Close(handle)`. Decrements the process-local refcount; on the last
/// close, if the calling thread still owns the lock, forces abandonment
/// before handing off to C6.
pub(crate) fn close(handle: Handle) {
    let key = shared_key(&handle.shared);
    let remaining = handle.shared.refcount.fetch_sub(1, Ordering::AcqRel) - 1;

    if remaining == 0 {
        // Clear any bookkeeping for this Arc's address now, so a future
        // SharedRef whose allocation happens to reuse the same address
        // never inherits a stale entry.
        OWNED.with(|o| {
            o.borrow_mut().remove(&key);
        });

        // Whether the calling thread currently owns the lock is read
        // straight from the shared lock state rather than the bookkeeping
        // above: this identity may have been closed to zero and reopened
        // under a fresh `SharedRef` earlier in this same thread's
        // lifetime (still holding the lock throughout), which would leave
        // no record keyed by the new Arc's address even though the OS
        // mutex is still held by this thread.
        if handle.shared.lock().is_current_owner() {
            if let Err(e) = handle.shared.lock().mark_abandoned_and_unlock() {
                log::warn!("failed to mark abandoned on close-while-held: {e}");
            }
        }

        if !matches!(handle.shared.identity, Identity::Unnamed) {
            let mut table = registry().lock();
            table.remove(&handle.shared.identity);
            drop(table);
        }

        match Arc::try_unwrap(handle.shared) {
            Ok(shared_ref) => shared_ref.unmap_and_maybe_unlink(),
            Err(_) => {
                // Another process/thread raced a fresh open between our
                // refcount hitting zero and the map removal; the file stays
                // referenced, nothing to unlink.
                log::trace!("close raced a concurrent open; leaving the reference in place");
            }
        }
    } else {
        // Another handle in this process still references it; just drop
        // this thread's acquisition bookkeeping if any remained at 0.
        OWNED.with(|o| {
            let mut map = o.borrow_mut();
            if map.get(&key).copied() == Some(0) {
                map.remove(&key);
            }
        });
    }
}

#[cfg(test)]
pub(crate) fn owned_count_for_test(handle: &Handle) -> u32 {
    let key = shared_key(&handle.shared);
    OWNED.with(|o| o.borrow().get(&key).copied().unwrap_or(0))
}

#[allow(dead_code)]
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<AtomicUsize>();
}
