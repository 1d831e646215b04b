//! Session state machine.
//!
//! ```text
//! NoSession ──start──▶ Active ──stop──▶ Stopped (archived)
//!     ▲                  │ record_change (dedup by path)
//!     └──────────────────┘
//! ```
//!
//! A [`SessionManager`] is bound to one working directory. The on-disk active
//! pointer is the source of truth; the in-memory handle is a cache that is
//! rewritten to disk after every mutation.

use super::store::{ArchivedSession, HistoryQuery, SessionStore};
use crate::error::{Error, Result};
use crate::types::{AnalysisResult, ChangeEntry, FileChange, Session, SessionStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// In-memory handle for the active session with a path index over `changes`.
#[derive(Debug, Clone)]
struct ActiveSession {
    session: Session,
    index: HashMap<String, usize>,
}

impl ActiveSession {
    fn new(session: Session) -> Self {
        let index = session
            .changes
            .iter()
            .enumerate()
            .map(|(i, change)| (change.path.clone(), i))
            .collect();
        Self { session, index }
    }

    fn apply(&mut self, change: &FileChange) {
        match self.index.get(&change.path) {
            Some(&i) => {
                let entry = &mut self.session.changes[i];
                entry.change_count += 1;
                entry.change_type = change.change_type;
                entry.timestamp = change.timestamp;
            }
            None => {
                self.index
                    .insert(change.path.clone(), self.session.changes.len());
                self.session.changes.push(ChangeEntry {
                    path: change.path.clone(),
                    change_type: change.change_type,
                    timestamp: change.timestamp,
                    change_count: 1,
                });
            }
        }
    }
}

/// Owns the lifecycle of sessions for one working directory.
#[derive(Debug)]
pub struct SessionManager {
    working_dir: PathBuf,
    store: SessionStore,
    active: Option<ActiveSession>,
}

/// Result of [`SessionManager::stop`].
#[derive(Debug, Clone)]
pub struct StoppedSession {
    pub session: Session,
    /// Location of the immutable history record
    pub archive_path: PathBuf,
}

impl SessionManager {
    /// Bind a manager to `working_dir`, which must be an existing directory.
    pub fn new(working_dir: impl AsRef<Path>) -> Result<Self> {
        let working_dir = working_dir.as_ref();
        if !working_dir.is_dir() {
            return Err(Error::Validation(format!(
                "working directory {} does not exist or is not a directory",
                working_dir.display()
            )));
        }
        let working_dir = working_dir.canonicalize()?;
        let store = SessionStore::new(&working_dir);

        Ok(Self {
            working_dir,
            store,
            active: None,
        })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Begin a new session.
    ///
    /// Fails with [`Error::SessionActive`] if any process already holds an
    /// active session for this directory; the existing record is untouched.
    pub fn start(&mut self) -> Result<Session> {
        if let Some(existing) = self.reload() {
            return Err(Error::SessionActive {
                id: existing.id.clone(),
            });
        }

        let now = Utc::now();
        let session = Session::new(
            now.timestamp_millis().to_string(),
            self.working_dir.clone(),
            now,
        );
        self.store.save_active(&session)?;
        self.active = Some(ActiveSession::new(session.clone()));

        tracing::info!(
            session_id = %session.id,
            working_dir = %self.working_dir.display(),
            "Session started"
        );
        Ok(session)
    }

    /// Fold one watcher event into the active session.
    ///
    /// The on-disk pointer is re-read first so a session stopped by another
    /// process is not resurrected. Returns `Ok(false)` when there is no
    /// active session and the event was dropped.
    pub fn record_change(&mut self, change: &FileChange) -> Result<bool> {
        self.reload();

        let Some(active) = self.active.as_mut() else {
            tracing::debug!(path = %change.path, "Dropping change, no active session");
            return Ok(false);
        };

        active.apply(change);
        self.store.save_active(&active.session)?;

        tracing::debug!(
            session_id = %active.session.id,
            path = %change.path,
            change_type = %change.change_type,
            "Recorded change"
        );
        Ok(true)
    }

    /// Record the pid of the detached watcher for this session.
    pub fn set_daemon_pid(&mut self, pid: Option<u32>) -> Result<()> {
        self.reload();
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| Error::NotFound("no active session".to_string()))?;
        active.session.daemon_process_id = pid;
        self.store.save_active(&active.session)
    }

    /// End the active session and archive it.
    ///
    /// Returns `Ok(None)` when no session is active.
    pub fn stop(
        &mut self,
        summary: Option<String>,
        analysis: Option<AnalysisResult>,
    ) -> Result<Option<StoppedSession>> {
        self.reload();
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        let mut session = active.session;
        session.end_time = Some(Utc::now());
        session.status = SessionStatus::Stopped;
        session.summary = summary;
        session.analysis = analysis;

        let archive_path = self.store.archive(&session)?;
        self.store.clear_active()?;

        tracing::info!(
            session_id = %session.id,
            files = session.changes.len(),
            archive = %archive_path.display(),
            "Session stopped"
        );
        Ok(Some(StoppedSession {
            session,
            archive_path,
        }))
    }

    /// The active session, from memory or from disk.
    ///
    /// Missing or malformed state reads as `None`.
    pub fn current(&self) -> Option<Session> {
        if let Some(active) = &self.active {
            return Some(active.session.clone());
        }
        self.load_from_disk()
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some_and(|s| s.status == SessionStatus::Active)
    }

    /// Replace the in-memory handle with whatever is on disk now.
    pub fn reload(&mut self) -> Option<&Session> {
        self.active = self
            .load_from_disk()
            .filter(Session::is_active)
            .map(ActiveSession::new);
        self.active.as_ref().map(|a| &a.session)
    }

    /// Archived sessions for this directory, newest first.
    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<ArchivedSession>> {
        self.store.list_history(query)
    }

    fn load_from_disk(&self) -> Option<Session> {
        match self.store.load_active() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable active session record");
                None
            }
        }
    }
}
