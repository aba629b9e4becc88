//! Test driver for named-mutex.
//!
//! - No arguments: runs every test group, across all four (user-scope,
//!   session-scope) combinations.
//! - `stress [minutes]`: stress mode (default 1 minute), one thread per
//!   (group, scope) pair.
//! - `<parentPid> <functionName> <userOnly:0|1> <sessionOnly:0|1> [stress]`:
//!   re-invokes this binary as a specific named child function; this is how
//!   the process-based sub-tests spawn themselves.

mod events;
mod naming;
mod proc;
mod stress;
mod tests;

use anyhow::{bail, Context, Result};

use naming::Scope;

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => run_all_scopes(std::process::id(), false),
        [cmd] if cmd == "stress" => stress::run(std::process::id(), stress::DEFAULT_DURATION_MINUTES),
        [cmd, minutes] if cmd == "stress" => {
            stress::run(std::process::id(), minutes.parse().context("parsing stress minutes")?)
        }
        [pid, function_name, user_only, session_only] => {
            dispatch_child(pid, function_name, user_only, session_only, false)
        }
        [pid, function_name, user_only, session_only, stress] if stress == "stress" => {
            dispatch_child(pid, function_name, user_only, session_only, true)
        }
        _ => bail!(
            "usage: mutex-tests\n   or: mutex-tests stress [minutes]\n   \
             or: mutex-tests <parentPid> <functionName> <userOnly:0|1> <sessionOnly:0|1> [stress]"
        ),
    }
}

fn run_all_scopes(parent_pid: u32, is_stress: bool) -> Result<()> {
    for scope in Scope::ALL {
        tests::run_all(parent_pid, scope, is_stress)?;
    }
    log::info!("all test groups passed");
    Ok(())
}

fn dispatch_child(pid: &str, function_name: &str, user_only: &str, session_only: &str, is_stress: bool) -> Result<()> {
    let parent_pid: u32 = pid.parse().context("parsing parentPid")?;
    let scope = Scope {
        current_user_only: parse_bool_flag(user_only)?,
        current_session_only: parse_bool_flag(session_only)?,
    };
    tests::dispatch_child(function_name, parent_pid, scope, is_stress)
}

fn parse_bool_flag(s: &str) -> Result<bool> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        other => bail!("expected 0 or 1, got {other:?}"),
    }
}
