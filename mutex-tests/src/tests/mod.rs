//! The six test groups, and the dispatch table used to re-invoke this binary
//! as a specific named child function (`<exe> <pid> <functionName> ...`).

pub(crate) mod lifetime;
pub(crate) mod mutual_exclusion;
pub(crate) mod name;

use anyhow::{Context, Result};

use crate::naming::Scope;

/// Runs every test group once for the given scope.
pub(crate) fn run_all(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    name::run(parent_pid, scope, is_stress).context("NameTests")?;
    header_mismatch::run(parent_pid, scope, is_stress).context("HeaderMismatchTests")?;
    mutual_exclusion::run(parent_pid, scope, is_stress).context("MutualExclusionTests")?;
    lifetime::run(parent_pid, scope, is_stress).context("LifetimeTests")?;
    abandon::run(parent_pid, scope, is_stress).context("AbandonTests")?;
    lock_close_without_thread_exit::run(parent_pid, scope, is_stress).context("LockAndCloseWithoutThreadExitTests")?;
    Ok(())
}

/// Dispatches to one of the named child functions spawned by the test groups
/// above (`proc::spawn_child`'s `function_name` argument).
pub(crate) fn dispatch_child(function_name: &str, parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    match function_name {
        "mutual_exclusion_child" => mutual_exclusion::run_child(parent_pid, scope, is_stress),
        "lifetime_child" => lifetime::run_child(parent_pid, scope, is_stress),
        "abandon_graceful_close_child" => abandon::graceful_close_child(parent_pid, scope, is_stress),
        "abandon_graceful_noclose_child" => abandon::graceful_noclose_child(parent_pid, scope, is_stress),
        "abandon_abrupt_exit_child" => abandon::abrupt_exit_child(parent_pid, scope, is_stress),
        "abandon_file_locks_parent_child" => abandon::file_locks_parent_child(parent_pid, scope, is_stress),
        "abandon_file_locks_child_child" => abandon::file_locks_child_child(parent_pid, scope, is_stress),
        "lock_close_same_thread_child" => {
            lock_close_without_thread_exit::close_on_same_thread_child(parent_pid, scope, is_stress)
        }
        "lock_close_different_thread_child" => {
            lock_close_without_thread_exit::close_on_different_thread_child(parent_pid, scope, is_stress)
        }
        other => anyhow::bail!("unknown child function {other:?}"),
    }
}
