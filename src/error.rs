//! Error taxonomy for the named-mutex subsystem.
//!
//! Every public entry point returns one of these variants instead of a raw
//! `errno`. The mapping from the underlying OS error is done once, at the
//! point where the OS result is observed, rather than threaded through as a
//! raw `i32` to callers (see `sys::pthread` and `lifetime`).

use std::fmt;
use std::io;

/// The error surface of the named-mutex subsystem.
///
/// Variant names are semantic, not drawn from any particular host's error
/// numbering scheme.
#[derive(Debug)]
#[non_exhaustive]
pub enum MutexError {
    /// The supplied name is empty after stripping a scope prefix, or
    /// contains a path separator.
    InvalidName,
    /// The on-disk path computed for the name would exceed the host's path
    /// length limit.
    FilenameExceedsRange,
    /// An existing backing file has a mismatched kind or format version.
    InvalidHandle,
    /// `Release` was called by a thread that does not own the mutex.
    NotOwner,
    /// `Create` reused an existing identity; informational, not fatal.
    AlreadyExists,
    /// A multi-object wait included a named-mutex handle.
    NotSupported,
    /// `Open` found no live reference for the requested identity.
    FileNotFound,
    /// A lower-level primitive returned an error this layer cannot
    /// interpret more specifically; the object remains usable.
    Failed(io::Error),
}

impl fmt::Display for MutexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutexError::InvalidName => write!(f, "invalid mutex name"),
            MutexError::FilenameExceedsRange => {
                write!(f, "mutex name exceeds the host's path length limit")
            }
            MutexError::InvalidHandle => {
                write!(f, "backing file has an unrecognized kind or version")
            }
            MutexError::NotOwner => write!(f, "calling thread does not own the mutex"),
            MutexError::AlreadyExists => write!(f, "a mutex with this name already exists"),
            MutexError::NotSupported => {
                write!(f, "operation not supported for a named mutex")
            }
            MutexError::FileNotFound => write!(f, "no mutex with this name exists"),
            MutexError::Failed(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for MutexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MutexError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MutexError {
    fn from(e: io::Error) -> Self {
        MutexError::Failed(e)
    }
}

pub type Result<T> = std::result::Result<T, MutexError>;
