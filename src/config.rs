//! Process-wide configuration for where and how backing files are placed.
//!
//! Split out from the root resolver so tests can point the subsystem at a
//! sandboxed directory instead of `/tmp`, mirroring how the teacher threads
//! a `MountOption` list through `Session::new` rather than hard-coding mount
//! behavior.

use std::path::{Path, PathBuf};

/// Linux's `PATH_MAX`; used as the default path-length ceiling (§4.1).
pub const DEFAULT_PATH_MAX: usize = 4096;

/// Guaranteed-success leaf length boundary (P9).
pub const MAX_LEAF_LEN: usize = 256;

/// Tunables for the shared-memory-file and directory layer.
///
/// The default matches the filesystem contract in spec §6 exactly
/// (`/tmp/.dotnet[-uid<euid>]/shm/<session|global>/<leaf>`); only tests
/// override `root`.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    path_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: PathBuf::from("/tmp"),
            path_max: DEFAULT_PATH_MAX,
        }
    }
}

impl Config {
    /// Build a config rooted at an arbitrary directory (used by tests to
    /// avoid touching the real `/tmp`).
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Config {
            root: root.as_ref().to_path_buf(),
            ..Config::default()
        }
    }

    /// Override the path-length ceiling used for `FilenameExceedsRange`.
    pub fn with_path_max(mut self, path_max: usize) -> Self {
        self.path_max = path_max;
        self
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn path_max(&self) -> usize {
        self.path_max
    }
}
