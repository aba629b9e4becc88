//! Deterministic name / path construction shared by every test group.
//!
//! Mirrors `BuildName`/`BuildShmFilePath` from the original palsuite driver:
//! names are namespaced by the root process's pid (and, in stress mode, by
//! test name too) so concurrently-running test groups never collide.

use std::path::PathBuf;

#[derive(Clone, Copy)]
pub(crate) struct Scope {
    pub(crate) current_user_only: bool,
    pub(crate) current_session_only: bool,
}

impl Scope {
    pub(crate) const ALL: [Scope; 4] = [
        Scope { current_user_only: false, current_session_only: false },
        Scope { current_user_only: false, current_session_only: true },
        Scope { current_user_only: true, current_session_only: false },
        Scope { current_user_only: true, current_session_only: true },
    ];
}

pub(crate) fn build_name(test_name: &str, prefix: &str, parent_pid: u32, scope: Scope, is_stress: bool) -> String {
    let mut name = String::new();
    if !scope.current_session_only {
        name.push_str("Global\\");
    }
    name.push_str(prefix);
    if is_stress {
        name.push_str(test_name);
        name.push('_');
    }
    name.push_str(&parent_pid.to_string());
    name
}

pub(crate) fn build_shm_file_path(test_name: &str, prefix: &str, parent_pid: u32, scope: Scope, is_stress: bool) -> PathBuf {
    let user_dir = if scope.current_user_only {
        format!(".dotnet-uid{}", nix::unistd::Uid::effective().as_raw())
    } else {
        ".dotnet".to_owned()
    };
    let session_dir = if scope.current_session_only {
        let sid = nix::unistd::getsid(None).map(|p| p.as_raw()).unwrap_or(0);
        format!("session{sid}")
    } else {
        "global".to_owned()
    };

    let mut leaf = prefix.to_owned();
    if is_stress {
        leaf.push_str(test_name);
        leaf.push('_');
    }
    leaf.push_str(&parent_pid.to_string());

    PathBuf::from("/tmp").join(user_dir).join("shm").join(session_dir).join(leaf)
}
