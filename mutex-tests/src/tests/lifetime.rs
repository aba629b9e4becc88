//! Reference-counted backing-file lifetime (P4, P8, scenario 2).

use anyhow::{ensure, Result};
use named_mutex::NamedMutex;

use crate::events;
use crate::naming::{build_name, build_shm_file_path, Scope};
use crate::proc::spawn_child;

const TEST_NAME: &str = "LifetimeTests";

fn solo_check(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    let name = build_name(TEST_NAME, "solo_", parent_pid, scope, is_stress);
    let path = build_shm_file_path(TEST_NAME, "solo_", parent_pid, scope, is_stress);
    let (m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;
    ensure!(path.exists(), "backing file should exist while a handle is open");
    drop(m);
    ensure!(!path.exists(), "backing file should be gone once the last handle closes");
    Ok(())
}

fn run_parent(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    let parent = events::initialize_parent(TEST_NAME, parent_pid, scope, is_stress)?;
    let mut ei = 0;
    let name = build_name(TEST_NAME, "m_", parent_pid, scope, is_stress);
    let path = build_shm_file_path(TEST_NAME, "m_", parent_pid, scope, is_stress);

    for _ in 0..2 {
        let (m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;
        ensure!(path.exists());
        events::yield_to_child(&parent, &mut ei)?; // child creates second reference
        drop(m); // close first reference
        ensure!(path.exists(), "second reference should keep the file alive");
        events::yield_to_child(&parent, &mut ei)?; // child closes second reference
        ensure!(!path.exists());
    }

    events::uninitialize_parent(TEST_NAME, parent_pid, scope, is_stress, &parent, true)?;
    Ok(())
}

pub(crate) fn run_child(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    let child = events::initialize_child(TEST_NAME, parent_pid, scope, is_stress)?;
    let mut ei = 0;
    let name = build_name(TEST_NAME, "m_", parent_pid, scope, is_stress);

    // Round 1: second reference via Create.
    {
        let (_m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;
        events::yield_to_parent(&child, &mut ei)?; // parent closes first reference
    } // second reference closed here

    // Round 2: second reference via Open.
    events::yield_to_parent(&child, &mut ei)?; // parent re-creates first reference
    {
        let _m = NamedMutex::open(&name, scope.current_user_only)?;
        events::yield_to_parent(&child, &mut ei)?; // parent closes first reference
    }

    events::yield_to_parent(&child, &mut ei)?; // parent verifies
    events::uninitialize_child(&child)?;
    Ok(())
}

pub(crate) fn run(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    solo_check(parent_pid, scope, is_stress)?;

    let handle = std::thread::spawn(move || run_child(parent_pid, scope, is_stress));
    run_parent(parent_pid, scope, is_stress)?;
    handle.join().expect("child thread panicked")?;

    let mut child = spawn_child(parent_pid, "lifetime_child", scope, is_stress)?;
    run_parent(parent_pid, scope, is_stress)?;
    let status = child.wait()?;
    ensure!(status.success(), "child process failed");

    Ok(())
}
