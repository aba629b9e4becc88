//! Spawns this same binary in child mode: `<exe> <parentPid> <functionName>
//! <userOnly:0|1> <sessionOnly:0|1> [stress]` (§6).

use std::process::{Child, Command};

use anyhow::{Context, Result};

use crate::naming::Scope;

pub(crate) fn spawn_child(parent_pid: u32, function_name: &str, scope: Scope, is_stress: bool) -> Result<Child> {
    let exe = std::env::current_exe().context("resolving current executable")?;
    let mut cmd = Command::new(exe);
    cmd.arg(parent_pid.to_string())
        .arg(function_name)
        .arg(if scope.current_user_only { "1" } else { "0" })
        .arg(if scope.current_session_only { "1" } else { "0" });
    if is_stress {
        cmd.arg("stress");
    }
    cmd.spawn().with_context(|| format!("spawning child for {function_name}"))
}
