//! Cross-process named mutex with recursive locking and abandonment
//! detection.
//!
//! A `named_mutex::NamedMutex` is modeled on the Win32 named-mutex API: a
//! mutex identified by a string name is shared by any process that creates
//! or opens it, supports recursive acquisition by its owning thread, and
//! reports `Abandoned` to the next acquirer if a previous owner died, or
//! explicitly closed its handle, while still holding it.
//!
//! ```no_run
//! use named_mutex::NamedMutex;
//!
//! let (handle, _already_existed) = NamedMutex::create("my-app-lock", true, false)?;
//! {
//!     let guard = handle.lock()?;
//!     if guard.is_abandoned() {
//!         // a previous owner died or closed without releasing; recover state here.
//!     }
//! } // released here
//! # Ok::<(), named_mutex::MutexError>(())
//! ```
//!
//! Two identities name the same mutex iff they agree on leaf name,
//! user-scope, and session-scope (see [`name::Identity`]); an empty name is
//! always a fresh, process-local, never-shared mutex.

mod config;
mod error;
mod header;
mod lifetime;
mod mutex;
mod name;
mod registry;
mod robust_lock;
mod shm_file;
mod sys;
mod wait;

pub use config::Config;
pub use error::{MutexError, Result};
pub use mutex::{MutexGuard, MutexHandle, NamedMutex};
pub use wait::WaitResult;
