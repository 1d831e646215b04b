//! On-disk session state for one working directory.
//!
//! Layout under `<workingDirectory>/.trak/`:
//!
//! ```text
//! current-session.json      active pointer (mutable, rewritten whole)
//! sessions/<ts>-<id>.json   archived sessions (immutable)
//! daemon.log                stdout/stderr of the detached watcher
//! ```
//!
//! Every write goes to a temp file in the same directory and is renamed into
//! place, so readers in other processes see either the old or the new
//! snapshot and never a truncated one.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Session;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const ACTIVE_FILE: &str = "current-session.json";
const HISTORY_DIR: &str = "sessions";
const DAEMON_LOG: &str = "daemon.log";

/// Filter for [`SessionStore::list_history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Maximum number of sessions to return
    pub limit: Option<usize>,
    /// Only sessions that started at or after this time
    pub from: Option<DateTime<Utc>>,
    /// Only sessions that started at or before this time
    pub to: Option<DateTime<Utc>>,
}

/// An archived session together with the file it was read from.
#[derive(Debug, Clone)]
pub struct ArchivedSession {
    pub path: PathBuf,
    pub session: Session,
}

/// File-backed storage for the active pointer and the session history.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Store rooted at `<working_dir>/.trak`
    pub fn new(working_dir: &Path) -> Self {
        Self {
            root: Config::project_state_dir(working_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR)
    }

    pub fn daemon_log_path(&self) -> PathBuf {
        self.root.join(DAEMON_LOG)
    }

    /// Read the active pointer.
    ///
    /// A missing or whitespace-only file is `Ok(None)`. Malformed JSON is a
    /// [`Error::Parse`]; callers on read paths treat that as absence too.
    pub fn load_active(&self) -> Result<Option<Session>> {
        let path = self.active_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))
    }

    /// Atomically replace the active pointer with `session`.
    pub fn save_active(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let tmp = self.write_temp(&self.root, session)?;
        tmp.persist(self.active_path()).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove the active pointer. Missing file is fine.
    pub fn clear_active(&self) -> Result<()> {
        match std::fs::remove_file(self.active_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `session` as a new immutable history record and return its path.
    ///
    /// Never overwrites an existing record.
    pub fn archive(&self, session: &Session) -> Result<PathBuf> {
        let dir = self.history_dir();
        std::fs::create_dir_all(&dir)?;

        let stamp = session.end_time.unwrap_or_else(Utc::now);
        let name = format!(
            "{}-{}.json",
            stamp.format("%Y-%m-%dT%H-%M-%S%.3fZ"),
            session.id
        );
        let path = dir.join(name);

        let tmp = self.write_temp(&dir, session)?;
        tmp.persist_noclobber(&path).map_err(|e| e.error)?;

        tracing::debug!(session_id = %session.id, path = %path.display(), "Archived session");
        Ok(path)
    }

    /// Archived sessions, newest first, filtered by start time.
    ///
    /// Records that cannot be read or parsed are skipped with a warning.
    pub fn list_history(&self, query: &HistoryQuery) -> Result<Vec<ArchivedSession>> {
        let dir = self.history_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match read_session(&path) {
                Ok(session) => {
                    if query.from.is_some_and(|from| session.start_time < from) {
                        continue;
                    }
                    if query.to.is_some_and(|to| session.start_time > to) {
                        continue;
                    }
                    sessions.push(ArchivedSession { path, session });
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable session record"
                    );
                }
            }
        }

        sessions.sort_by(|a, b| {
            b.session
                .start_time
                .cmp(&a.session.start_time)
                .then_with(|| b.path.cmp(&a.path))
        });
        if let Some(limit) = query.limit {
            sessions.truncate(limit);
        }
        Ok(sessions)
    }

    /// Fetch one archived session by id.
    pub fn find_history(&self, id: &str) -> Result<ArchivedSession> {
        self.list_history(&HistoryQuery::default())?
            .into_iter()
            .find(|archived| archived.session.id == id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    fn write_temp(&self, dir: &Path, session: &Session) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), session)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

fn read_session(path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| Error::Parse(format!("{}: {e}", path.display())))
}
