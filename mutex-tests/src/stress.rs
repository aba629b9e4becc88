//! Stress mode: one thread per (test group, scope) pair, looped for a
//! configurable duration, with pass/fail/iteration counts reported at the end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};

use crate::naming::Scope;
use crate::tests;

pub(crate) const DEFAULT_DURATION_MINUTES: u64 = 1;

type GroupFn = fn(u32, Scope, bool) -> Result<()>;

const GROUPS: &[(&str, GroupFn)] = &[
    ("NameTests", tests::name::run),
    ("HeaderMismatchTests", tests::header_mismatch::run),
    ("MutualExclusionTests", tests::mutual_exclusion::run),
    ("LifetimeTests", tests::lifetime::run),
    ("AbandonTests", tests::abandon::run),
    ("LockAndCloseWithoutThreadExitTests", tests::lock_close_without_thread_exit::run),
];

#[derive(Default)]
struct Counters {
    iterations: AtomicU64,
    failures: AtomicU64,
}

pub(crate) fn run(parent_pid: u32, minutes: u64) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(minutes.max(1) * 60);
    log::info!("stress mode: running for {} minute(s)", minutes.max(1));

    let mut workers = Vec::new();
    for &(label, f) in GROUPS {
        for scope in Scope::ALL {
            let counters = Arc::new(Counters::default());
            let reporter = Arc::clone(&counters);
            let worker_label = format!("{label}[user={}, session={}]", scope.current_user_only, scope.current_session_only);
            let thread_label = worker_label.clone();
            let handle = std::thread::spawn(move || {
                while Instant::now() < deadline {
                    if let Err(e) = f(parent_pid, scope, true) {
                        reporter.failures.fetch_add(1, Ordering::Relaxed);
                        log::warn!("{thread_label} iteration failed: {e:#}");
                    }
                    reporter.iterations.fetch_add(1, Ordering::Relaxed);
                }
            });
            workers.push((worker_label, counters, handle));
        }
    }

    let mut total_failures = 0u64;
    for (label, counters, handle) in workers {
        handle.join().expect("stress worker thread panicked");
        let iterations = counters.iterations.load(Ordering::Relaxed);
        let failures = counters.failures.load(Ordering::Relaxed);
        total_failures += failures;
        log::info!("{label}: {iterations} iterations, {failures} failures");
    }

    ensure!(total_failures == 0, "{total_failures} stress iteration(s) failed");
    Ok(())
}
