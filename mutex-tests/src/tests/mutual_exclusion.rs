//! Recursive locking, timeouts, and multi-wait refusal (P1–P3, P6, scenario
//! 1). Runs the same parent logic once against a thread-spawned child and
//! once against a process-spawned child.

use std::time::Duration;

use anyhow::{ensure, Result};
use named_mutex::{MutexError, NamedMutex, WaitResult};

use crate::events;
use crate::naming::{build_name, Scope};
use crate::proc::spawn_child;

const TEST_NAME: &str = "MutualExclusionTests";
const EXPECTED_TIMEOUT: Duration = Duration::from_millis(500);

fn solo_checks(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    let name = build_name(TEST_NAME, "solo_", parent_pid, scope, is_stress);

    // Releasing an unowned lock fails with NOT_OWNER.
    let (m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;
    ensure!(matches!(m.release(), Err(MutexError::NotOwner)));

    // initiallyOwned=true, then release.
    let name2 = build_name(TEST_NAME, "solo2_", parent_pid, scope, is_stress);
    let (m2, _) = NamedMutex::create(&name2, scope.current_user_only, true)?;
    m2.release()?;

    // Multi-wait including a named mutex is not supported (P6).
    let (unnamed, _) = NamedMutex::create("", scope.current_user_only, false)?;
    match NamedMutex::wait_multiple(&[&unnamed, &m], false, Some(Duration::from_secs(30))) {
        Err(MutexError::NotSupported) => {}
        other => anyhow::bail!("expected NotSupported, got {other:?}"),
    }
    match NamedMutex::wait_multiple(&[&unnamed, &m], true, Some(Duration::from_secs(30))) {
        Err(MutexError::NotSupported) => {}
        other => anyhow::bail!("expected NotSupported, got {other:?}"),
    }
    Ok(())
}

fn run_parent(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    let parent = events::initialize_parent(TEST_NAME, parent_pid, scope, is_stress)?;
    let mut ei = 0;
    let name = build_name(TEST_NAME, "m_", parent_pid, scope, is_stress);
    let (m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;

    ensure!(m.try_wait()? == WaitResult::Signaled);
    ensure!(m.wait(Some(Duration::from_secs(30)))? == WaitResult::Signaled);
    ensure!(m.wait(None)? == WaitResult::Signaled);
    m.release()?;
    m.release()?;
    m.release()?;
    ensure!(matches!(m.release(), Err(MutexError::NotOwner)));

    events::yield_to_child(&parent, &mut ei)?; // child takes the lock

    ensure!(m.try_wait()? == WaitResult::TimedOut);
    ensure!(m.wait(Some(EXPECTED_TIMEOUT))? == WaitResult::TimedOut);
    ensure!(matches!(m.release(), Err(MutexError::NotOwner)));

    events::yield_to_child(&parent, &mut ei)?; // child releases the lock

    ensure!(m.wait(None)? == WaitResult::Signaled);
    m.release()?;

    events::uninitialize_parent(TEST_NAME, parent_pid, scope, is_stress, &parent, true)?;
    Ok(())
}

pub(crate) fn run_child(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    let child = events::initialize_child(TEST_NAME, parent_pid, scope, is_stress)?;
    let mut ei = 0;
    let name = build_name(TEST_NAME, "m_", parent_pid, scope, is_stress);
    let (m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;
    ensure!(m.try_wait()? == WaitResult::Signaled);
    events::yield_to_parent(&child, &mut ei)?;
    m.release()?;
    events::uninitialize_child(&child)?;
    Ok(())
}

pub(crate) fn run(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    solo_checks(parent_pid, scope, is_stress)?;

    // Thread-based child.
    let handle = std::thread::spawn(move || run_child(parent_pid, scope, is_stress));
    run_parent(parent_pid, scope, is_stress)?;
    handle.join().expect("child thread panicked")?;

    // Process-based child.
    let mut child = spawn_child(parent_pid, "mutual_exclusion_child", scope, is_stress)?;
    run_parent(parent_pid, scope, is_stress)?;
    let status = child.wait()?;
    ensure!(status.success(), "child process failed");

    Ok(())
}
