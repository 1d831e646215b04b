//! Filesystem watcher that turns raw notifications into [`FileChange`] events.
//!
//! Built on `notify-debouncer-mini`: a path is reported only after it has
//! been quiet for `debounce_ms`, so editor autosave bursts collapse into one
//! event. The debouncer only says "something happened at this path", so the
//! change type is derived from a set of known files seeded at start:
//!
//! | On disk | Known | Emitted |
//! |---------|-------|---------|
//! | yes     | no    | Added |
//! | yes     | yes   | Modified |
//! | no      | yes   | Deleted |
//! | no      | no    | nothing |
//!
//! Directories are expanded. A directory that appears (created, renamed in,
//! unpacked) yields `Added` for every tracked file under it that is not yet
//! known, since the OS watch on a fresh subtree may be registered after its
//! files were written. A directory that disappears yields `Deleted` for every
//! known file under it.
//!
//! Errors from the OS watcher are sent over the channel returned by
//! [`FileWatcher::take_errors`]; they never stop the watcher.

use crate::config::{WatcherConfig, STATE_DIR_NAME};
use crate::error::{Error, Result};
use crate::types::{ChangeType, FileChange};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use walkdir::WalkDir;

type ChangeCallback = Box<dyn FnMut(&FileChange) + Send>;

/// Decides which paths under the watched root are tracked.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: HashSet<String>,
    exclude: Vec<glob::Pattern>,
}

impl PathFilter {
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        let exclude = config
            .exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p)
                    .map_err(|e| Error::Config(format!("invalid exclude pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let extensions = config
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            extensions,
            exclude,
        })
    }

    /// Whether a file at `rel` (relative, `/`-separated) should be tracked
    pub fn is_tracked(&self, rel: &str) -> bool {
        if self.is_excluded(rel) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        Path::new(rel)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }

    fn is_excluded(&self, rel: &str) -> bool {
        rel.split('/').any(|part| part == STATE_DIR_NAME)
            || self.exclude.iter().any(|p| p.matches(rel))
    }

    /// A directory is excluded when any file directly inside it would be
    fn is_excluded_dir(&self, rel: &str) -> bool {
        self.is_excluded(&format!("{rel}/_"))
    }
}

/// State shared with the debouncer thread.
struct Shared {
    root: PathBuf,
    filter: PathFilter,
    known: Mutex<HashSet<String>>,
    callbacks: Arc<Mutex<Vec<ChangeCallback>>>,
    errors: Sender<Error>,
}

impl Shared {
    fn handle(&self, result: DebounceEventResult) {
        let events = match result {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "File watcher error");
                let _ = self.errors.send(Error::Watch(e.to_string()));
                return;
            }
        };

        let mut paths: Vec<PathBuf> = events
            .into_iter()
            .filter(|event| matches!(event.kind, DebouncedEventKind::Any))
            .map(|event| event.path)
            .collect();
        paths.sort();
        paths.dedup();

        // A directory walk can report a file that also has its own event in this batch
        let mut emitted = HashSet::new();
        for path in paths {
            for change in self.classify(&path) {
                if !emitted.insert(change.path.clone()) {
                    continue;
                }
                let mut callbacks = lock(&self.callbacks);
                for callback in callbacks.iter_mut() {
                    callback(&change);
                }
            }
        }
    }

    fn classify(&self, path: &Path) -> Vec<FileChange> {
        let Some(rel) = relative_key(&self.root, path) else {
            return Vec::new();
        };

        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => self.appeared_dir(path, &rel),
            Ok(_) => {
                if !self.filter.is_tracked(&rel) {
                    return Vec::new();
                }
                let change_type = if lock(&self.known).insert(rel.clone()) {
                    ChangeType::Added
                } else {
                    ChangeType::Modified
                };
                vec![FileChange::new(change_type, rel)]
            }
            Err(_) => self.vanished(&rel),
        }
    }

    /// `Added` for every tracked, not yet known file under a directory.
    fn appeared_dir(&self, dir: &Path, rel: &str) -> Vec<FileChange> {
        if self.filter.is_excluded_dir(rel) {
            return Vec::new();
        }
        let found = walk_tracked(&self.root, dir, &self.filter, &self.errors);
        let mut known = lock(&self.known);
        found
            .into_iter()
            .filter(|file| known.insert(file.clone()))
            .map(|file| FileChange::new(ChangeType::Added, file))
            .collect()
    }

    /// `Deleted` for `rel` itself and for every known file below it.
    fn vanished(&self, rel: &str) -> Vec<FileChange> {
        let prefix = format!("{rel}/");
        let mut known = lock(&self.known);
        let mut gone: Vec<String> = known
            .iter()
            .filter(|k| k.as_str() == rel || k.starts_with(&prefix))
            .cloned()
            .collect();
        gone.sort();
        for file in &gone {
            known.remove(file);
        }
        gone.into_iter()
            .map(|file| FileChange::new(ChangeType::Deleted, file))
            .collect()
    }
}

/// Watches a directory tree and reports qualifying file changes.
pub struct FileWatcher {
    filter: PathFilter,
    debounce: Duration,
    callbacks: Arc<Mutex<Vec<ChangeCallback>>>,
    errors_tx: Sender<Error>,
    errors_rx: Option<Receiver<Error>>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl FileWatcher {
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        let (errors_tx, errors_rx) = mpsc::channel();
        Ok(Self {
            filter: PathFilter::new(config)?,
            debounce: Duration::from_millis(config.debounce_ms.max(1)),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            errors_tx,
            errors_rx: Some(errors_rx),
            debouncer: None,
        })
    }

    /// Register a listener invoked once per emitted change, on the watcher thread.
    pub fn on_change<F>(&mut self, callback: F)
    where
        F: FnMut(&FileChange) + Send + 'static,
    {
        lock(&self.callbacks).push(Box::new(callback));
    }

    /// Take the receiving end of the error channel. Only the first call returns it.
    pub fn take_errors(&mut self) -> Option<Receiver<Error>> {
        self.errors_rx.take()
    }

    /// Start watching `dir` recursively.
    ///
    /// Returns once the OS watch is registered; events for changes made after
    /// this returns will be reported.
    pub fn start(&mut self, dir: &Path) -> Result<()> {
        if self.debouncer.is_some() {
            return Err(Error::Watch("watcher is already running".to_string()));
        }

        let root = dir.canonicalize()?;
        let known = self.snapshot(&root);
        tracing::debug!(root = %root.display(), files = known.len(), "Seeded known files");

        let handler = Arc::new(Shared {
            root: root.clone(),
            filter: self.filter.clone(),
            known: Mutex::new(known),
            callbacks: Arc::clone(&self.callbacks),
            errors: self.errors_tx.clone(),
        });

        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            handler.handle(result);
        })
        .map_err(|e| Error::Watch(format!("failed to create watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(format!("failed to watch {}: {e}", root.display())))?;

        tracing::info!(
            root = %root.display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "Watching for changes"
        );
        self.debouncer = Some(debouncer);
        Ok(())
    }

    /// Stop watching and release OS handles. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some(debouncer) = self.debouncer.take() {
            drop(debouncer);
            tracing::info!("File watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.debouncer.is_some()
    }

    /// Relative paths of every tracked file currently under `root`.
    fn snapshot(&self, root: &Path) -> HashSet<String> {
        walk_tracked(root, root, &self.filter, &self.errors_tx)
            .into_iter()
            .collect()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tracked files under `dir`, as keys relative to `root`, in walk order.
///
/// Excluded directories are not descended into. Unreadable entries are
/// reported on `errors` and skipped.
fn walk_tracked(
    root: &Path,
    dir: &Path,
    filter: &PathFilter,
    errors: &Sender<Error>,
) -> Vec<String> {
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            relative_key(root, entry.path())
                .map(|rel| !filter.is_excluded_dir(&rel))
                .unwrap_or(false)
        });

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if let Some(rel) = relative_key(root, entry.path()) {
                    if filter.is_tracked(&rel) {
                        files.push(rel);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable path");
                let _ = errors.send(Error::Watch(e.to_string()));
            }
        }
    }
    files
}

/// `path` relative to `root`, joined with `/`. `None` outside the root or for the root itself.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
