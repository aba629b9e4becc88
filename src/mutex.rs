//! Public API surface (C7): [`NamedMutex`], [`MutexHandle`], and the
//! [`MutexGuard`] scoped-acquisition convenience built on top of it.

use std::time::Duration;

use crate::config::Config;
use crate::error::{MutexError, Result};
use crate::name::Identity;
use crate::registry::{self, Handle};
use crate::wait::WaitResult;

/// An open reference to a named (or unnamed) mutex.
///
/// Dropping a `MutexHandle` is equivalent to calling [`MutexHandle::close`];
/// it is provided so callers who want to observe close-time errors (there
/// are none today, but see §4.4) can call it explicitly.
pub struct MutexHandle {
    inner: Option<Handle>,
    config: Config,
}

impl std::fmt::Debug for MutexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexHandle").field("inner", &self.inner).finish()
    }
}

impl MutexHandle {
    fn new(handle: Handle, config: Config) -> Self {
        MutexHandle {
            inner: Some(handle),
            config,
        }
    }

    fn handle(&self) -> &Handle {
        self.inner.as_ref().expect("handle used after close")
    }

    /// Blocks (up to `timeout`, `None` = forever) until the mutex is
    /// acquired by the calling thread. Recursive: a thread that already
    /// owns the mutex succeeds immediately and increments recursion depth.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitResult> {
        crate::wait::wait_one(self.handle(), timeout)
    }

    /// `wait(Some(Duration::ZERO))`: never blocks.
    pub fn try_wait(&self) -> Result<WaitResult> {
        self.wait(Some(Duration::ZERO))
    }

    /// Releases one level of recursion. Fails with [`MutexError::NotOwner`]
    /// if the calling thread does not currently own the mutex; state is
    /// unchanged in that case (I4).
    pub fn release(&self) -> Result<()> {
        if registry::release(self.handle())? {
            Ok(())
        } else {
            Err(MutexError::NotOwner)
        }
    }

    /// Acquires the mutex and returns a guard that releases it on drop.
    pub fn lock(&self) -> Result<MutexGuard<'_>> {
        let outcome = self.wait(None)?;
        Ok(MutexGuard {
            handle: self,
            abandoned: outcome == WaitResult::Abandoned,
        })
    }

    /// Explicitly closes the handle. Equivalent to dropping it.
    pub fn close(mut self) {
        if let Some(handle) = self.inner.take() {
            registry::close(handle);
        }
    }

    /// The [`Config`] this handle was opened under, for diagnostics.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for MutexHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.take() {
            registry::close(handle);
        }
    }
}

/// A scope-bound lock on a [`MutexHandle`]: releases exactly once, on drop.
pub struct MutexGuard<'a> {
    handle: &'a MutexHandle,
    abandoned: bool,
}

impl MutexGuard<'_> {
    /// Whether the previous owner abandoned the mutex (died, or closed its
    /// handle without releasing) rather than releasing it normally.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release() {
            log::warn!("guard release failed: {e}");
        }
    }
}

/// Entry points mirroring §4.2's `Create`/`Open` operations.
pub struct NamedMutex;

impl NamedMutex {
    /// `Create(name, currentUserOnly, initiallyOwned)` against the default
    /// [`Config`]. Returns the handle and whether an identical identity was
    /// already live (`ALREADY_EXISTS`, informational, not an error).
    pub fn create(name: &str, current_user_only: bool, initially_owned: bool) -> Result<(MutexHandle, bool)> {
        Self::create_with_config(name, current_user_only, initially_owned, Config::default())
    }

    pub fn create_with_config(
        name: &str,
        current_user_only: bool,
        initially_owned: bool,
        config: Config,
    ) -> Result<(MutexHandle, bool)> {
        let identity = Identity::parse(name, current_user_only, &config)?;
        let (handle, already_existed) = registry::create(identity, initially_owned, &config)?;
        Ok((MutexHandle::new(handle, config), already_existed))
    }

    /// `Open(name, currentUserOnly)`. Fails with [`MutexError::FileNotFound`]
    /// if no live reference exists in this process or on disk.
    pub fn open(name: &str, current_user_only: bool) -> Result<MutexHandle> {
        Self::open_with_config(name, current_user_only, Config::default())
    }

    pub fn open_with_config(name: &str, current_user_only: bool, config: Config) -> Result<MutexHandle> {
        let identity = Identity::parse(name, current_user_only, &config)?;
        let handle = registry::open(identity, &config)?;
        Ok(MutexHandle::new(handle, config))
    }

    /// A multi-object wait including a named mutex is always refused (P6):
    /// see [`crate::wait::wait_multiple`].
    pub fn wait_multiple(handles: &[&MutexHandle], wait_all: bool, timeout: Option<Duration>) -> Result<WaitResult> {
        let refs: Vec<&Handle> = handles.iter().map(|h| h.handle()).collect();
        crate::wait::wait_multiple(&refs, wait_all, timeout)
    }
}
