//! Control of the detached background watcher process.
//!
//! `trak start --detach` re-executes the current binary as
//! `trak daemon --dir <wd>` in its own process group and records the pid in
//! the active session. `trak stop` signals that pid before finalizing.

use crate::error::Result;
use crate::session::SessionStore;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of [`terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process was already gone
    NotRunning,
    /// SIGTERM was delivered and the process exited
    Terminated,
    /// SIGTERM was delivered but the process outlived the timeout
    TimedOut,
}

/// Launch `<exe> daemon --dir <working_dir>` detached from the caller.
///
/// stdout and stderr are appended to `.trak/daemon.log`. Returns the pid.
pub fn spawn(exe: &Path, working_dir: &Path) -> Result<u32> {
    let store = SessionStore::new(working_dir);
    std::fs::create_dir_all(store.root())?;
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(store.daemon_log_path())?;

    let mut command = Command::new(exe);
    command
        .arg("daemon")
        .arg("--dir")
        .arg(working_dir)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    // Never waited on: the spawning CLI exits right away and init reaps the orphan
    #[allow(clippy::zombie_processes)]
    let child = command.spawn()?;
    let pid = child.id();
    tracing::info!(pid, working_dir = %working_dir.display(), "Spawned background watcher");
    Ok(pid)
}

/// Whether a process with `pid` exists.
pub fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        match i32::try_from(pid) {
            Ok(pid) if pid > 0 => unsafe { libc::kill(pid, 0) == 0 },
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Send SIGTERM to `pid` and wait up to `timeout` for it to exit.
///
/// Signal failures are treated as "already gone".
pub fn terminate(pid: u32, timeout: Duration) -> TerminateOutcome {
    if !is_alive(pid) {
        return TerminateOutcome::NotRunning;
    }
    if !send_sigterm(pid) {
        tracing::debug!(pid, "SIGTERM not delivered, assuming process exited");
        return TerminateOutcome::NotRunning;
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            tracing::info!(pid, "Background watcher terminated");
            return TerminateOutcome::Terminated;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    if is_alive(pid) {
        tracing::warn!(
            pid,
            timeout_ms = timeout.as_millis() as u64,
            "Background watcher did not exit in time"
        );
        TerminateOutcome::TimedOut
    } else {
        TerminateOutcome::Terminated
    }
}

fn send_sigterm(pid: u32) -> bool {
    #[cfg(unix)]
    {
        match i32::try_from(pid) {
            // SAFETY: plain signal delivery to a positive pid; ESRCH is reported as failure.
            Ok(pid) if pid > 0 => unsafe { libc::kill(pid, libc::SIGTERM) == 0 },
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
