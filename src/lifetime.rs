//! Directory / lifetime manager (C6) and the process-local `SharedRef` that
//! C4's registry keys its table by.
//!
//! Coordination uses one `flock(2)` advisory lock per process per identity,
//! held on the backing file's fd for as long as this process has any open
//! handle to that identity. This is the same mechanism surfaced in the
//! retrieval pack's `flock.rs`-style helpers (cargo/rattler), adapted from
//! "acquire shared to read, upgrade to exclusive to mutate" into "acquire
//! shared to hold a reference, try upgrade non-blocking to detect sole
//! ownership on last close".

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::fcntl::{flock, FlockArg};

use crate::config::Config;
use crate::error::{MutexError, Result};
use crate::header::{FileHeader, LockBody, HEADER_SIZE};
use crate::name::Identity;
use crate::robust_lock::RobustLock;
use crate::shm_file::{self, Mapping};

/// Heap-allocated storage for an unnamed mutex's `LockBody`. Unnamed
/// mutexes are never shared (spec §4.1: empty name ⇒ a brand-new,
/// process-local object every time), so they never touch the filesystem or
/// C6 at all.
struct HeapLockBody {
    ptr: *mut LockBody,
}

unsafe impl Send for HeapLockBody {}
unsafe impl Sync for HeapLockBody {}

impl HeapLockBody {
    fn new(initially_owned: bool) -> io::Result<Self> {
        let layout = Layout::new::<LockBody>();
        let ptr = unsafe { alloc_zeroed(layout) } as *mut LockBody;
        if ptr.is_null() {
            return Err(io::Error::from(io::ErrorKind::OutOfMemory));
        }
        unsafe { RobustLock::init_in_place(ptr, initially_owned)? };
        Ok(HeapLockBody { ptr })
    }
}

impl Drop for HeapLockBody {
    fn drop(&mut self) {
        unsafe {
            RobustLock::destroy_in_place(self.ptr);
            dealloc(self.ptr as *mut u8, Layout::new::<LockBody>());
        }
    }
}

enum Storage {
    Named {
        file: File,
        mapping: Mapping,
        path: PathBuf,
    },
    Unnamed(HeapLockBody),
}

/// The process-local reference to one mutex identity: what C4's registry
/// maps `Identity -> Arc<SharedRef>`. All handles in this process sharing
/// an identity share one `SharedRef`.
pub(crate) struct SharedRef {
    pub(crate) identity: Identity,
    storage: Storage,
    /// Number of open handles in this process referencing this identity.
    pub(crate) refcount: AtomicUsize,
}

impl SharedRef {
    pub(crate) fn lock(&self) -> RobustLock {
        let ptr = match &self.storage {
            Storage::Named { mapping, .. } => unsafe {
                mapping.as_ptr().add(HEADER_SIZE) as *mut LockBody
            },
            Storage::Unnamed(heap) => heap.ptr,
        };
        unsafe { RobustLock::from_raw(ptr) }
    }

    /// Creates a brand-new unnamed (process-local) mutex. Never registered
    /// under an identity — see [`HeapLockBody`]'s doc comment.
    pub(crate) fn create_unnamed(initially_owned: bool) -> Result<SharedRef> {
        let heap = HeapLockBody::new(initially_owned)?;
        Ok(SharedRef {
            identity: Identity::Unnamed,
            storage: Storage::Unnamed(heap),
            refcount: AtomicUsize::new(1),
        })
    }

    /// Creates or opens the backing file for a named identity (C2 + C6
    /// combined): builds the path, creates the directory chain, opens (or
    /// creates) the file, and — on creation — initializes the header and
    /// lock body while holding an exclusive advisory lock, so no other
    /// process can observe a partially-initialized mapping (closes the
    /// TOCTOU window spec.md leaves implicit).
    ///
    /// Returns the ref plus whether this call created the identity (so
    /// `Create` can report `ALREADY_EXISTS`) or, for `open_existing`,
    /// whether the file was pre-existing at all.
    pub(crate) fn open_or_create(
        identity: Identity,
        initially_owned: bool,
        config: &Config,
        require_existing: bool,
    ) -> Result<(SharedRef, bool)> {
        let Some((path, mode)) = shm_file::backing_path(&identity, config) else {
            return SharedRef::create_unnamed(initially_owned).map(|r| (r, true));
        };

        if require_existing && !path.exists() {
            return Err(MutexError::FileNotFound);
        }

        shm_file::ensure_parent_dirs(&path, mode, config)?;
        let (file, created) = shm_file::open_backing_file(&path)?;

        if require_existing && created {
            // We raced a concurrent delete; treat as not-found rather than
            // silently creating a new, empty-history object under Open.
            let _ = std::fs::remove_file(&path);
            return Err(MutexError::FileNotFound);
        }

        // Hold the advisory lock across mapping + (if we created it) init,
        // so a concurrent opener blocks until initialization is complete.
        if created {
            flock(&file, FlockArg::LockExclusive).map_err(io::Error::from)?;
        } else {
            flock(&file, FlockArg::LockShared).map_err(io::Error::from)?;
        }

        let mapping = Mapping::map(&file)?;

        if created {
            unsafe {
                let header = FileHeader::new();
                std::ptr::write(mapping.as_ptr() as *mut FileHeader, header);
                RobustLock::init_in_place(
                    mapping.as_ptr().add(HEADER_SIZE) as *mut LockBody,
                    initially_owned,
                )?;
            }
            // Downgrade to the steady-state shared "I hold a reference" lock.
            flock(&file, FlockArg::LockShared).map_err(io::Error::from)?;
        } else {
            let header = unsafe { &*(mapping.as_ptr() as *const FileHeader) };
            if !header.is_valid_mutex_header() {
                return Err(MutexError::InvalidHandle);
            }
        }

        let shared_ref = SharedRef {
            identity,
            storage: Storage::Named {
                file,
                mapping,
                path,
            },
            refcount: AtomicUsize::new(1),
        };
        Ok((shared_ref, created))
    }

    /// Called when this process's last handle to this identity closes.
    /// Attempts to upgrade to an exclusive advisory lock; success means no
    /// other process still holds a shared lock, so the file is unlinked.
    /// Failure (another process holds it) just drops the mapping/fd,
    /// leaving cleanup to whoever closes last.
    pub(crate) fn unmap_and_maybe_unlink(self) {
        let SharedRef { storage, .. } = self;
        if let Storage::Named { file, path, .. } = storage {
            match flock(&file, FlockArg::LockExclusiveNonblock) {
                Ok(()) => {
                    log::debug!("last reference to {:?} closed locally; removing", path);
                    let _ = std::fs::remove_file(&path);
                }
                Err(nix::errno::Errno::EWOULDBLOCK) => {
                    log::trace!("{:?} still referenced by another process", path);
                }
                Err(e) => {
                    log::warn!("advisory lock upgrade failed for {:?}: {e}", path);
                }
            }
            // `file`/`mapping` drop here, releasing the fd/flock and munmap.
        }
    }
}

impl std::fmt::Debug for SharedRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRef")
            .field("identity", &self.identity)
            .field("refcount", &self.refcount.load(Ordering::Relaxed))
            .finish()
    }
}
