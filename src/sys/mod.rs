//! Raw FFI collaborators for the robust lock and shared-memory layers.
//!
//! Kept separate from the logic that uses them, the way the teacher keeps
//! `ll::fuse_abi` (raw kernel ABI types) apart from the code that interprets
//! them.

pub(crate) mod ids;
pub(crate) mod pthread;
