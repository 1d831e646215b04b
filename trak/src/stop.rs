//! `trak stop`: end the session, review it, archive it and report it.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use trak_core::daemon::{self, TerminateOutcome};
use trak_core::format::format_duration;
use trak_core::report::OrgReporter;
use trak_core::{
    llm, AnalysisResult, ChangeType, Config, FileContents, QualityAnalyzer, Session,
    SessionManager, SummaryGenerator, SummarySource,
};

const DAEMON_EXIT_TIMEOUT: Duration = Duration::from_secs(5);
const TOP_ISSUES: usize = 3;

pub fn run(config: &Config, manager: &mut SessionManager, report: bool) -> Result<()> {
    let Some(pid) = manager.reload().map(|s| s.daemon_process_id) else {
        bail!("no active session in {}", manager.working_dir().display());
    };

    if let Some(pid) = pid {
        match daemon::terminate(pid, DAEMON_EXIT_TIMEOUT) {
            TerminateOutcome::Terminated => println!("Stopped background watcher (pid {pid})"),
            TerminateOutcome::NotRunning => {
                tracing::debug!(pid, "Background watcher was not running")
            }
            TerminateOutcome::TimedOut => {
                eprintln!("Warning: background watcher (pid {pid}) did not exit, continuing")
            }
        }
    }

    // Pick up anything the watcher wrote before it exited
    let Some(session) = manager.reload().cloned() else {
        bail!("the session was stopped by another process");
    };

    let files = read_changed_files(&session);
    let client = llm::client_from_config(config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    spinner.set_message(format!("Analyzing {} file(s)...", files.len()));
    let analysis = QualityAnalyzer::new(client.clone()).analyze(&session, &files);

    spinner.set_message("Writing summary...");
    let summary = SummaryGenerator::new(client).generate(&session, &files, &analysis);
    spinner.finish_and_clear();

    if summary.source == SummarySource::Fallback {
        tracing::info!(session_id = %session.id, "Using local summary");
    }

    let stopped = manager
        .stop(Some(summary.text), Some(analysis))
        .context("failed to archive session")?;
    let Some(stopped) = stopped else {
        bail!("the session was stopped by another process");
    };

    print_session(&stopped.session);
    println!();
    println!("Saved to {}", stopped.archive_path.display());

    if report {
        send_report(config, &stopped.session);
    }
    Ok(())
}

/// Contents of every changed file that still exists, keyed by relative path.
fn read_changed_files(session: &Session) -> FileContents {
    let mut files = FileContents::new();
    for change in &session.changes {
        if change.change_type == ChangeType::Deleted {
            continue;
        }
        let path = session.working_directory.join(&change.path);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                files.insert(change.path.clone(), text);
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable file")
            }
        }
    }
    files
}

fn print_session(session: &Session) {
    let counts = session.change_counts();
    println!("Session {} stopped", session.id);
    println!("Duration: {}", format_duration(session.duration()));
    println!(
        "Files:    {} ({} added, {} modified, {} deleted)",
        session.changes.len(),
        counts.added,
        counts.modified,
        counts.deleted
    );

    if let Some(analysis) = &session.analysis {
        print_analysis(analysis);
    }

    if let Some(summary) = &session.summary {
        println!();
        println!("Summary:");
        for line in summary.lines() {
            println!("  {line}");
        }
    }
}

fn print_analysis(analysis: &AnalysisResult) {
    let count = analysis.metrics.issue_count;
    println!("Quality:  {}/100", analysis.metrics.quality_score);
    println!(
        "Issues:   {} ({} high, {} medium, {} low)",
        analysis.total_issues, count.high, count.medium, count.low
    );
    if analysis.is_degraded() {
        println!("          ({} review)", analysis.source.as_str());
    }

    let mut top: Vec<_> = analysis.issues.iter().collect();
    top.sort_by_key(|issue| issue.severity);
    if !top.is_empty() {
        println!();
        println!("Top issues:");
        for issue in top.into_iter().take(TOP_ISSUES) {
            println!(
                "  [{}] {}:{} {}",
                issue.severity.as_str(),
                issue.file_path,
                issue.line_number,
                issue.description
            );
        }
    }
}

fn send_report(config: &Config, session: &Session) {
    let reporter = match OrgReporter::new(&config.org) {
        Ok(Some(reporter)) => reporter,
        Ok(None) => return,
        Err(e) => {
            eprintln!("Warning: org reporting is misconfigured: {e}");
            return;
        }
    };

    let report = reporter.build_report(session);
    if reporter.send_blocking(&report) {
        println!("Reported session to your organization");
    } else {
        eprintln!("Warning: could not report session to your organization");
    }
}
