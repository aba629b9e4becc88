//! Shared-memory file: path layout, directory creation, and mapping (C2).

use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroUsize;
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use bitflags::bitflags;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::config::Config;
use crate::header::FILE_SIZE;
use crate::name::Identity;
use crate::sys::ids;

bitflags! {
    /// Directory permission bits for the two scope tiers (§3 Backing file
    /// path). Mirrors the way the teacher expresses raw mode/flag bits as a
    /// `bitflags` set rather than bare integers (see `bsd_file_flags.rs`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct DirMode: u32 {
        const OWNER_RWX = libc::S_IRWXU as u32;
        const GROUP_RWX = libc::S_IRWXG as u32;
        const OTHER_RWX = libc::S_IRWXO as u32;
        const STICKY    = libc::S_ISVTX as u32;
    }
}

impl DirMode {
    /// Owner-only (`0700`) for user-scoped directories.
    pub(crate) const USER_SCOPED: DirMode = DirMode::OWNER_RWX;
    /// World-read/write with the sticky bit (`0777` + sticky) for the
    /// shared namespace, so any user can create session subdirectories but
    /// only the owner of a file can remove it.
    pub(crate) const SHARED: DirMode =
        DirMode::OWNER_RWX.union(DirMode::GROUP_RWX).union(DirMode::OTHER_RWX).union(DirMode::STICKY);
}

/// Computes the deterministic backing file path for `identity` (§3).
///
/// Returns `None` for [`Identity::Unnamed`] — it has no backing file.
pub(crate) fn backing_path(identity: &Identity, config: &Config) -> Option<(PathBuf, DirMode)> {
    let Identity::Named {
        user_scope,
        session_scope,
        leaf,
    } = identity
    else {
        return None;
    };

    let (user_dir, mode) = if *user_scope {
        (format!(".dotnet-uid{}", ids::effective_uid()), DirMode::USER_SCOPED)
    } else {
        (".dotnet".to_owned(), DirMode::SHARED)
    };
    let session_dir = if *session_scope {
        format!("session{}", ids::session_id())
    } else {
        "global".to_owned()
    };

    let path = config
        .root()
        .join(user_dir)
        .join("shm")
        .join(session_dir)
        .join(leaf);
    Some((path, mode))
}

/// Creates the directory chain leading to `path`'s parent with `mode`,
/// applied explicitly via `chmod` since `mkdir`'s requested mode is subject
/// to the process umask.
pub(crate) fn ensure_parent_dirs(path: &Path, mode: DirMode, config: &Config) -> io::Result<()> {
    let root = config.root();
    let parent = path.parent().expect("backing_path always has a parent");

    // Only create/chmod the components under `root` — root itself (e.g.
    // `/tmp`) is assumed to already exist with sane permissions.
    let relative = parent
        .strip_prefix(root)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path escapes configured root"))?;

    let mut cur = root.to_path_buf();
    for component in relative.components() {
        cur.push(component);
        create_and_chmod(&cur, mode)?;
    }
    Ok(())
}

fn create_and_chmod(dir: &Path, mode: DirMode) -> io::Result<()> {
    match std::fs::create_dir(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    let c_path = std::ffi::CString::new(dir.as_os_str().as_encoded_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    let rc = unsafe { libc::chmod(c_path.as_ptr(), mode.bits() as libc::mode_t) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Opens (creating if absent) the backing file, with `O_EXCL` semantics
/// exposed via the returned `bool` (`true` ⇒ this call created the file).
pub(crate) fn open_backing_file(path: &Path) -> io::Result<(File, bool)> {
    match OpenOptions::new()
        .read(true)
        .write(true)
        .mode(0o600)
        .custom_flags(libc::O_CREAT | libc::O_EXCL)
        .open(path)
    {
        Ok(f) => Ok((f, true)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let f = OpenOptions::new().read(true).write(true).open(path)?;
            Ok((f, false))
        }
        Err(e) => Err(e),
    }
}

/// An mmap'd region backing one mutex's shared file. `ptr` is valid for
/// `FILE_SIZE` bytes for the lifetime of this value.
pub(crate) struct Mapping {
    ptr: NonNull<u8>,
}

unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    pub(crate) fn map(file: &File) -> io::Result<Mapping> {
        file.set_len(FILE_SIZE as u64)?;
        let len = NonZeroUsize::new(FILE_SIZE).expect("FILE_SIZE is non-zero");
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file.as_fd(),
                0,
            )
            .map_err(io::Error::from)?
        };
        Ok(Mapping { ptr: ptr.cast() })
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.cast(), FILE_SIZE);
        }
    }
}
