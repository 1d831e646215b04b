//! Watch loops for `trak start` (foreground) and `trak daemon` (background).
//!
//! The watcher thread only forwards events over a channel; this thread owns
//! the [`SessionManager`] and records changes in the order they arrive.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use trak_core::{Config, FileChange, FileWatcher, SessionManager};

/// How often the loop wakes up to check for shutdown and stopped sessions.
const TICK: Duration = Duration::from_millis(250);

/// Why a watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Interrupted,
    SessionEnded,
}

/// Watch in the foreground until Ctrl+C. The session stays active afterwards.
pub fn run_foreground(config: &Config, manager: &mut SessionManager) -> Result<()> {
    println!("Watching for changes. Press Ctrl+C to stop watching.");
    println!();

    match watch_until_done(config, manager, true)? {
        Exit::Interrupted => {
            println!();
            println!("Stopped watching. The session is still active, run `trak stop` to finish it.");
        }
        Exit::SessionEnded => println!("Session ended elsewhere, stopped watching."),
    }
    Ok(())
}

/// Entry point of the detached watcher process.
pub fn run_daemon(config: &Config, manager: &mut SessionManager) -> Result<()> {
    let Some(session_id) = manager.reload().map(|s| s.id.clone()) else {
        tracing::warn!(
            dir = %manager.working_dir().display(),
            "Background watcher started without an active session"
        );
        return Ok(());
    };
    tracing::info!(
        %session_id,
        pid = std::process::id(),
        "Background watcher running"
    );

    let exit = watch_until_done(config, manager, false)?;
    tracing::info!(?exit, "Background watcher exiting");
    Ok(())
}

fn watch_until_done(config: &Config, manager: &mut SessionManager, echo: bool) -> Result<Exit> {
    // SIGINT, SIGTERM and SIGHUP all land here with the `termination` feature
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set signal handler")?;

    let (tx, rx) = mpsc::channel::<FileChange>();
    let mut watcher = FileWatcher::new(&config.watcher).context("invalid watcher configuration")?;
    watcher.on_change(move |change| {
        let _ = tx.send(change.clone());
    });
    let errors = watcher.take_errors();
    watcher
        .start(manager.working_dir())
        .context("failed to start file watcher")?;

    let exit = loop {
        if !running.load(Ordering::SeqCst) {
            // Changes the watcher already delivered still belong to the session
            drain_pending(manager, &rx, echo)?;
            break Exit::Interrupted;
        }

        if let Some(errors) = &errors {
            for e in errors.try_iter() {
                if echo {
                    eprintln!("Watcher error: {e}");
                }
            }
        }

        match rx.recv_timeout(TICK) {
            Ok(change) => {
                if !record(manager, &change, echo)? {
                    break Exit::SessionEnded;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if manager.reload().is_none() {
                    break Exit::SessionEnded;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break Exit::SessionEnded,
        }
    };

    watcher.stop();
    Ok(exit)
}

/// Record one change. `false` once the session has been stopped elsewhere.
fn record(manager: &mut SessionManager, change: &FileChange, echo: bool) -> Result<bool> {
    let recorded = manager
        .record_change(change)
        .with_context(|| format!("failed to record change to {}", change.path))?;
    if recorded && echo {
        let tracked = manager.current().map(|s| s.changes.len()).unwrap_or(0);
        println!(
            "[{}] {:<8} {}  ({} file(s) tracked)",
            chrono::Local::now().format("%H:%M:%S"),
            change.change_type.as_str(),
            change.path,
            tracked
        );
    }
    Ok(recorded)
}

/// Record whatever is already queued without waiting for more.
fn drain_pending(
    manager: &mut SessionManager,
    rx: &Receiver<FileChange>,
    echo: bool,
) -> Result<()> {
    for change in rx.try_iter() {
        if !record(manager, &change, echo)? {
            break;
        }
    }
    Ok(())
}
