//! Parent/child synchronization built entirely out of named mutexes, used as
//! one-shot event objects. This is the only cross-process primitive the
//! subsystem under test provides, so the harness bootstraps everything else
//! (ping-pong handoff between a parent and child) on top of it — mirroring
//! `InitializeParent`/`YieldToChild`/`YieldToParent` in the original driver.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use named_mutex::{MutexHandle, NamedMutex, WaitResult};

use crate::naming::{build_name, Scope};

pub(crate) const FAIL_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn event_name(test_name: &str, prefix: &str, parent_pid: u32, scope: Scope, is_stress: bool) -> String {
    build_name(test_name, prefix, parent_pid, scope, is_stress)
}

fn create_event(name: &str, scope: Scope, initially_owned: bool) -> Result<MutexHandle> {
    let (handle, already_existed) = NamedMutex::create(name, scope.current_user_only, initially_owned)?;
    ensure!(!already_existed, "event '{name}' already existed, tests would interfere");
    Ok(handle)
}

fn wait_for_event_created(name: &str, scope: Scope) -> Result<MutexHandle> {
    let start = Instant::now();
    loop {
        match NamedMutex::open(name, scope.current_user_only) {
            Ok(h) => return Ok(h),
            Err(named_mutex::MutexError::FileNotFound) => {}
            Err(e) => return Err(e.into()),
        }
        ensure!(start.elapsed() < FAIL_TIMEOUT, "timed out waiting for event '{name}' to be created");
        sleep(POLL_INTERVAL);
    }
}

pub(crate) struct ParentEvents {
    pub(crate) events: [MutexHandle; 2],
    pub(crate) child_events: [MutexHandle; 2],
}

pub(crate) fn initialize_parent(test_name: &str, parent_pid: u32, scope: Scope, is_stress: bool) -> Result<ParentEvents> {
    let events = [
        create_event(&event_name(test_name, "pe0_", parent_pid, scope, is_stress), scope, true)?,
        create_event(&event_name(test_name, "pe1_", parent_pid, scope, is_stress), scope, true)?,
    ];
    let child_events = [
        wait_for_event_created(&event_name(test_name, "ce0_", parent_pid, scope, is_stress), scope)?,
        wait_for_event_created(&event_name(test_name, "ce1_", parent_pid, scope, is_stress), scope)?,
    ];
    Ok(ParentEvents { events, child_events })
}

pub(crate) fn uninitialize_parent(test_name: &str, parent_pid: u32, scope: Scope, is_stress: bool, parent: &ParentEvents, release_parent_events: bool) -> Result<()> {
    if release_parent_events {
        parent.events[0].release().context("release parentEvents[0]")?;
        parent.events[1].release().context("release parentEvents[1]")?;
    }
    let running = wait_for_event_created(&event_name(test_name, "cr_", parent_pid, scope, is_stress), scope)?;
    ensure!(running.wait(Some(FAIL_TIMEOUT))? != WaitResult::TimedOut, "timed out waiting to acquire childRunningEvent");
    running.release().context("release childRunningEvent")?;
    Ok(())
}

pub(crate) struct ChildEvents {
    pub(crate) running: MutexHandle,
    pub(crate) parent_events: [MutexHandle; 2],
    pub(crate) events: [MutexHandle; 2],
}

pub(crate) fn initialize_child(test_name: &str, parent_pid: u32, scope: Scope, is_stress: bool) -> Result<ChildEvents> {
    let running = create_event(&event_name(test_name, "cr_", parent_pid, scope, is_stress), scope, false);
    let running = match running {
        Ok(h) => h,
        Err(_) => wait_for_event_created(&event_name(test_name, "cr_", parent_pid, scope, is_stress), scope)?,
    };
    ensure!(running.wait(Some(FAIL_TIMEOUT))? != WaitResult::TimedOut, "timed out acquiring childRunningEvent");

    let events = [
        create_event(&event_name(test_name, "ce0_", parent_pid, scope, is_stress), scope, true)?,
        create_event(&event_name(test_name, "ce1_", parent_pid, scope, is_stress), scope, true)?,
    ];
    let parent_events = [
        wait_for_event_created(&event_name(test_name, "pe0_", parent_pid, scope, is_stress), scope)?,
        wait_for_event_created(&event_name(test_name, "pe1_", parent_pid, scope, is_stress), scope)?,
    ];

    ensure!(parent_events[0].wait(Some(FAIL_TIMEOUT))? != WaitResult::TimedOut);
    parent_events[0].release()?;

    Ok(ChildEvents { running, parent_events, events })
}

pub(crate) fn uninitialize_child(child: &ChildEvents) -> Result<()> {
    child.events[0].release().context("release childEvents[0]")?;
    child.events[1].release().context("release childEvents[1]")?;
    child.running.release().context("release childRunningEvent")?;
    Ok(())
}

/// Parent releases `events[ei]`, waits for the child's matching event, then
/// flips `ei`.
pub(crate) fn yield_to_child(parent: &ParentEvents, ei: &mut usize) -> Result<()> {
    parent.events[*ei].release().context("release parentEvents[ei]")?;
    ensure!(parent.child_events[*ei].wait(Some(FAIL_TIMEOUT))? != WaitResult::TimedOut, "child did not respond in time");
    parent.child_events[*ei].release().context("release childEvents[ei]")?;
    ensure!(parent.events[*ei].try_wait()? != WaitResult::TimedOut, "child did not yield back");
    *ei = 1 - *ei;
    Ok(())
}

/// Symmetric counterpart run from the child side.
pub(crate) fn yield_to_parent(child: &ChildEvents, ei: &mut usize) -> Result<()> {
    child.events[*ei].release().context("release childEvents[ei]")?;
    *ei = 1 - *ei;
    ensure!(child.parent_events[*ei].wait(Some(FAIL_TIMEOUT))? != WaitResult::TimedOut, "parent did not respond in time");
    child.parent_events[*ei].release().context("release parentEvents[ei]")?;
    ensure!(child.events[1 - *ei].try_wait()? != WaitResult::TimedOut, "parent did not yield back");
    Ok(())
}
