//! trak - development session tracker
//!
//! Watches a working directory while you code, then reviews what changed.
//!
//! Uses XDG Base Directory specification for global file locations:
//! - Config: $XDG_CONFIG_HOME/trak/config.toml (~/.config/trak/config.toml)
//! - Logs: $XDG_STATE_HOME/trak/trak.log (~/.local/state/trak/trak.log)
//!
//! Per-project state lives in `<dir>/.trak/`.

mod stop;
mod watch;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trak_core::format::{format_duration, format_duration_precise, format_relative_time};
use trak_core::logging::ProcessRole;
use trak_core::session::ArchivedSession;
use trak_core::{daemon, Config, Error, HistoryQuery, Session, SessionManager};

#[derive(Parser)]
#[command(name = "trak")]
#[command(about = "Track a development session and review the changes")]
#[command(version)]
struct Args {
    /// Working directory to track (default: current directory)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new session and watch for changes
    Start {
        /// Watch in a background process instead of the foreground
        #[arg(long)]
        detach: bool,
    },

    /// Stop the active session, analyze it and archive it
    Stop {
        /// Skip the organization report
        #[arg(long)]
        no_report: bool,
    },

    /// Show the active session
    Status {
        /// Print the session record as JSON
        #[arg(long)]
        json: bool,
    },

    /// List archived sessions, newest first
    History {
        /// Maximum number of sessions to list
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only sessions started on or after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date_start)]
        from: Option<DateTime<Utc>>,

        /// Only sessions started on or before this date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date_end)]
        to: Option<DateTime<Utc>>,

        /// Print sessions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one archived session as JSON
    Show {
        /// Session id
        id: String,
    },

    /// Background watcher started by `start --detach`
    #[command(hide = true)]
    Daemon,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let role = if matches!(args.command, Command::Daemon) {
        ProcessRole::Daemon
    } else {
        ProcessRole::Cli
    };
    let _log_guard =
        trak_core::logging::init(&config.logging, role).context("failed to initialize logging")?;

    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let mut manager = SessionManager::new(&dir)
        .with_context(|| format!("cannot track {}", dir.display()))?;

    match args.command {
        Command::Start { detach } => cmd_start(&config, &mut manager, detach),
        Command::Stop { no_report } => stop::run(&config, &mut manager, !no_report),
        Command::Status { json } => cmd_status(&manager, json),
        Command::History {
            limit,
            from,
            to,
            json,
        } => cmd_history(&manager, HistoryQuery { limit, from, to }, json),
        Command::Show { id } => cmd_show(&manager, &id),
        Command::Daemon => watch::run_daemon(&config, &mut manager),
    }
}

fn cmd_start(config: &Config, manager: &mut SessionManager, detach: bool) -> Result<()> {
    let session = match manager.start() {
        Ok(session) => session,
        Err(Error::SessionActive { id }) => {
            bail!("a session is already active (id {id}); run `trak stop` first")
        }
        Err(e) => return Err(e).context("failed to start session"),
    };

    println!("Session {} started", session.id);
    println!("Tracking {}", manager.working_dir().display());

    if detach {
        let exe = std::env::current_exe().context("failed to locate trak executable")?;
        let pid = daemon::spawn(&exe, manager.working_dir())
            .context("failed to spawn background watcher")?;
        manager
            .set_daemon_pid(Some(pid))
            .context("failed to record background watcher pid")?;
        println!("Watching in the background (pid {pid}). Run `trak stop` to finish.");
        return Ok(());
    }

    watch::run_foreground(config, manager)
}

fn cmd_status(manager: &SessionManager, json: bool) -> Result<()> {
    let Some(session) = manager.current() else {
        println!("No active session");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    let counts = session.change_counts();
    println!("Session:   {}", session.id);
    println!("Directory: {}", session.working_directory.display());
    println!(
        "Started:   {} ({})",
        format_relative_time(session.start_time),
        format_duration_precise(session.duration())
    );
    match session.daemon_process_id {
        Some(pid) if daemon::is_alive(pid) => println!("Watcher:   background (pid {pid})"),
        Some(pid) => println!("Watcher:   background pid {pid} is not running"),
        None => println!("Watcher:   foreground"),
    }
    println!(
        "Files:     {} ({} added, {} modified, {} deleted)",
        session.changes.len(),
        counts.added,
        counts.modified,
        counts.deleted
    );

    let recent = session.recent_changes(10);
    if !recent.is_empty() {
        println!();
        println!("Recent changes:");
        for change in recent {
            println!(
                "  {:<9} {} (x{}, {})",
                change.change_type.as_str(),
                change.path,
                change.change_count,
                format_relative_time(change.timestamp)
            );
        }
    }
    Ok(())
}

fn cmd_history(manager: &SessionManager, query: HistoryQuery, json: bool) -> Result<()> {
    let archived = manager
        .history(&query)
        .context("failed to read session history")?;

    if json {
        let sessions: Vec<&Session> = archived.iter().map(|a| &a.session).collect();
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if archived.is_empty() {
        println!("No archived sessions");
        return Ok(());
    }

    println!(
        "{:<15} {:<12} {:>8} {:>6} {:>7}",
        "ID", "STARTED", "DURATION", "FILES", "QUALITY"
    );
    for ArchivedSession { session, .. } in &archived {
        let quality = session
            .analysis
            .as_ref()
            .map(|a| format!("{}/100", a.metrics.quality_score))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<15} {:<12} {:>8} {:>6} {:>7}",
            session.id,
            format_relative_time(session.start_time),
            format_duration(session.duration()),
            session.changes.len(),
            quality
        );
    }
    Ok(())
}

fn cmd_show(manager: &SessionManager, id: &str) -> Result<()> {
    let archived = manager
        .store()
        .find_history(id)
        .with_context(|| format!("no archived session with id {id}"))?;
    println!("{}", serde_json::to_string_pretty(&archived.session)?);
    Ok(())
}

fn parse_date(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("expected YYYY-MM-DD or RFC 3339, got {value:?}"))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| format!("invalid date {value:?}"))
}

fn parse_date_start(value: &str) -> Result<DateTime<Utc>, String> {
    parse_date(value, false)
}

fn parse_date_end(value: &str) -> Result<DateTime<Utc>, String> {
    parse_date(value, true)
}
