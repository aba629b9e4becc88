//! Fixed on-disk/ in-memory layout of a mutex's backing file (§3).
//!
//! ```text
//! offset 0   : u8   kind     (0 = named mutex)
//! offset 1   : u8   version  (1)
//! offset 2..8: [u8;6] reserved, zero
//! offset 8   : LockBody (the robust lock primitive, C3)
//! ```

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Shared-object kind. Only `MUTEX` is implemented; others would be
/// out-of-scope collaborators per §1 (e.g. an event object).
pub(crate) const KIND_MUTEX: u8 = 0;

/// Current on-disk format version.
pub(crate) const CURRENT_VERSION: u8 = 1;

/// The first 8 bytes of a backing file: kind, version, and reserved padding.
///
/// Plain-old-data, read and written directly against the mmap'd bytes via
/// `zerocopy` rather than hand-rolled byte indexing.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub(crate) struct FileHeader {
    pub(crate) kind: u8,
    pub(crate) version: u8,
    pub(crate) reserved: [u8; 6],
}

impl FileHeader {
    pub(crate) fn new() -> Self {
        FileHeader {
            kind: KIND_MUTEX,
            version: CURRENT_VERSION,
            reserved: [0; 6],
        }
    }

    pub(crate) fn is_valid_mutex_header(&self) -> bool {
        self.kind == KIND_MUTEX && self.version == CURRENT_VERSION
    }
}

pub(crate) const HEADER_SIZE: usize = std::mem::size_of::<FileHeader>();

/// The robust lock body (C3): embeds the raw OS mutex plus the recursion
/// and abandonment bookkeeping described in §3's Data Model.
///
/// Lives at a fixed offset inside the mmap'd region. All three bookkeeping
/// fields are mutated only while `raw` is held by the mutating thread, so no
/// separate synchronization is needed for them — the mutex protects its own
/// metadata.
#[repr(C)]
pub(crate) struct LockBody {
    pub(crate) raw: libc::pthread_mutex_t,
    /// Recursion depth; 0 while free, per thread currently holding `raw`.
    pub(crate) depth: AtomicU32,
    /// Kernel thread id of the current owner; 0 while free.
    pub(crate) owner_tid: AtomicI32,
    /// Set by [`crate::registry`] when the owning thread closes its last
    /// handle without releasing, so the next acquirer sees `Abandoned` even
    /// though the OS never observed the owner's death.
    pub(crate) abandon_flag: AtomicU8,
}

pub(crate) const LOCK_BODY_SIZE: usize = std::mem::size_of::<LockBody>();

/// Total size of the mapped region for a named-mutex backing file.
pub(crate) const FILE_SIZE: usize = HEADER_SIZE + LOCK_BODY_SIZE;
