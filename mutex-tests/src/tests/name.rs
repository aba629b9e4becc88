//! Name resolution and validation (P7, P9, P10).

use anyhow::{ensure, Result};
use named_mutex::{MutexError, NamedMutex};

use crate::naming::{build_name, Scope};

const TEST_NAME: &str = "NameTests";
const NORMAL_PREFIX: &str = "name_";
const INVALID_PREFIX_0: &str = "paltest\\namedmutex_";
const INVALID_PREFIX_1: &str = "paltest/namedmutex_";

pub(crate) fn run(parent_pid: u32, scope: Scope, is_stress: bool) -> Result<()> {
    // Empty name: always succeeds, never shared.
    let (m, already_existed) = NamedMutex::create("", scope.current_user_only, false)?;
    ensure!(!already_existed);
    drop(m);

    // Normal name, plus the optional "Local\" prefix when session-scoped.
    let name = build_name(TEST_NAME, NORMAL_PREFIX, parent_pid, scope, is_stress);
    let (m, _) = NamedMutex::create(&name, scope.current_user_only, false)?;
    NamedMutex::open(&name, scope.current_user_only)?;
    if scope.current_session_only {
        let with_prefix = format!("Local\\{name}");
        NamedMutex::open(&with_prefix, scope.current_user_only)?;
        let (_m2, already_existed) = NamedMutex::create(&with_prefix, scope.current_user_only, false)?;
        ensure!(already_existed, "Local\\ prefix must resolve to the same identity as no prefix");
    }
    drop(m);

    // Leaf length boundary: 256 succeeds, 257 fails (P9).
    let ok_leaf = "a".repeat(256);
    let too_long_leaf = "a".repeat(257);
    let (ok_handle, _) = NamedMutex::create(&ok_leaf, scope.current_user_only, false)?;
    drop(ok_handle);
    match NamedMutex::create(&too_long_leaf, scope.current_user_only, false) {
        Err(MutexError::FilenameExceedsRange) => {}
        other => anyhow::bail!("expected FilenameExceedsRange, got {other:?}"),
    }
    match NamedMutex::open(&too_long_leaf, scope.current_user_only) {
        Err(MutexError::FilenameExceedsRange) => {}
        other => anyhow::bail!("expected FilenameExceedsRange, got {other:?}"),
    }

    // Separators in the name are rejected (P10).
    for bad in [
        build_name(TEST_NAME, INVALID_PREFIX_0, parent_pid, scope, is_stress),
        build_name(TEST_NAME, INVALID_PREFIX_1, parent_pid, scope, is_stress),
    ] {
        match NamedMutex::create(&bad, scope.current_user_only, false) {
            Err(MutexError::InvalidName) => {}
            other => anyhow::bail!("expected InvalidName for {bad:?}, got {other:?}"),
        }
        match NamedMutex::open(&bad, scope.current_user_only) {
            Err(MutexError::InvalidName) => {}
            other => anyhow::bail!("expected InvalidName for {bad:?}, got {other:?}"),
        }
    }

    // A second Create of the same identity reports ALREADY_EXISTS (informational).
    let dup_name = build_name(TEST_NAME, "dup_", parent_pid, scope, is_stress);
    let (m1, existed1) = NamedMutex::create(&dup_name, scope.current_user_only, false)?;
    ensure!(!existed1);
    let (_m2, existed2) = NamedMutex::create(&dup_name, scope.current_user_only, false)?;
    ensure!(existed2);
    drop(m1);

    Ok(())
}
