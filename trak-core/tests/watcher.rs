//! Filesystem watcher tests against a real temp directory.

use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tempfile::TempDir;
use trak_core::config::WatcherConfig;
use trak_core::{ChangeType, Error, FileChange, FileWatcher, SessionManager};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> WatcherConfig {
    WatcherConfig {
        debounce_ms: 100,
        ..WatcherConfig::default()
    }
}

fn watch(dir: &Path) -> (FileWatcher, Receiver<FileChange>) {
    trak_core::logging::init_test();
    let (tx, rx) = mpsc::channel();
    let mut watcher = FileWatcher::new(&fast_config()).unwrap();
    watcher.on_change(move |change| {
        let _ = tx.send(change.clone());
    });
    watcher.start(dir).unwrap();
    assert!(watcher.is_running());
    (watcher, rx)
}

/// Next event for `path`, skipping unrelated ones.
fn next_for(rx: &Receiver<FileChange>, path: &str) -> FileChange {
    loop {
        let change = rx.recv_timeout(WAIT).expect("expected a change event");
        if change.path == path {
            return change;
        }
    }
}

#[test]
fn create_then_modify_is_recorded_as_one_entry() {
    let dir = TempDir::new().unwrap();
    let mut manager = SessionManager::new(dir.path()).unwrap();
    manager.start().unwrap();
    let (mut watcher, rx) = watch(dir.path());

    std::fs::write(dir.path().join("a.ts"), "export const a = 1;\n").unwrap();
    let added = next_for(&rx, "a.ts");
    assert_eq!(added.change_type, ChangeType::Added);
    manager.record_change(&added).unwrap();

    for n in 2..=3 {
        std::fs::write(dir.path().join("a.ts"), format!("export const a = {n};\n")).unwrap();
        let modified = next_for(&rx, "a.ts");
        assert_eq!(modified.change_type, ChangeType::Modified);
        manager.record_change(&modified).unwrap();
    }

    watcher.stop();
    assert!(!watcher.is_running());

    let session = manager.current().unwrap();
    assert_eq!(session.changes.len(), 1);
    assert_eq!(session.changes[0].path, "a.ts");
    assert_eq!(session.changes[0].change_type, ChangeType::Modified);
    assert_eq!(session.changes[0].change_count, 3);
}

#[test]
fn preexisting_files_report_modified_and_deleted() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "pub fn a() {}\n").unwrap();
    let (_watcher, rx) = watch(dir.path());

    std::fs::write(dir.path().join("src/lib.rs"), "pub fn b() {}\n").unwrap();
    assert_eq!(next_for(&rx, "src/lib.rs").change_type, ChangeType::Modified);

    std::fs::remove_file(dir.path().join("src/lib.rs")).unwrap();
    assert_eq!(next_for(&rx, "src/lib.rs").change_type, ChangeType::Deleted);
}

#[test]
fn excluded_and_untracked_paths_are_ignored() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
    std::fs::create_dir_all(dir.path().join(".trak")).unwrap();
    let (_watcher, rx) = watch(dir.path());

    std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
    std::fs::write(dir.path().join(".trak/current-session.json"), "{}").unwrap();
    std::fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();
    std::fs::write(dir.path().join("marker.md"), "# done\n").unwrap();

    // marker.md was written last; nothing else may arrive before or after it
    let change = rx.recv_timeout(WAIT).expect("expected marker event");
    assert_eq!(change.path, "marker.md");
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
fn starting_twice_is_an_error() {
    let dir = TempDir::new().unwrap();
    let (mut watcher, _rx) = watch(dir.path());
    assert!(watcher.start(dir.path()).is_err());
    watcher.stop();
    watcher.stop();
}

#[test]
fn files_in_a_new_nested_directory_are_added() {
    let dir = TempDir::new().unwrap();
    let (_watcher, rx) = watch(dir.path());

    // Written before the OS watch on the new subtree can exist
    std::fs::create_dir_all(dir.path().join("new/deep")).unwrap();
    std::fs::write(dir.path().join("new/deep/b.ts"), "export const b = 1;\n").unwrap();

    assert_eq!(next_for(&rx, "new/deep/b.ts").change_type, ChangeType::Added);
}

#[test]
fn renaming_a_directory_moves_its_files() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/a.ts"), "export const a = 1;\n").unwrap();
    let (_watcher, rx) = watch(dir.path());

    std::fs::rename(dir.path().join("src"), dir.path().join("lib")).unwrap();

    let mut deleted = false;
    let mut added = false;
    while !(deleted && added) {
        let change = rx.recv_timeout(WAIT).expect("expected a change event");
        match (change.change_type, change.path.as_str()) {
            (ChangeType::Deleted, "src/a.ts") => deleted = true,
            (ChangeType::Added, "lib/a.ts") => added = true,
            _ => {}
        }
    }
}

#[test]
fn a_burst_of_writes_is_one_event() {
    let dir = TempDir::new().unwrap();
    let (tx, rx) = mpsc::channel();
    let config = WatcherConfig {
        debounce_ms: 300,
        ..WatcherConfig::default()
    };
    let mut watcher = FileWatcher::new(&config).unwrap();
    watcher.on_change(move |change| {
        let _ = tx.send(change.clone());
    });
    watcher.start(dir.path()).unwrap();

    for n in 0..10 {
        std::fs::write(dir.path().join("a.ts"), format!("export const a = {n};\n")).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    let change = rx.recv_timeout(WAIT).expect("expected one event");
    assert_eq!(change.path, "a.ts");
    assert_eq!(change.change_type, ChangeType::Added);
    assert!(rx.recv_timeout(Duration::from_secs(1)).is_err());
}

#[cfg(unix)]
#[test]
fn unreadable_directories_are_reported_on_the_error_channel() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let locked = dir.path().join("locked");
    std::fs::create_dir_all(&locked).unwrap();
    std::fs::write(locked.join("inner.ts"), "export {};\n").unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // Permission bits do not apply to root
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let mut watcher = FileWatcher::new(&fast_config()).unwrap();
    let errors = watcher.take_errors().expect("error receiver");
    assert!(watcher.take_errors().is_none());
    // The OS watch may also refuse the locked directory; the scan error is sent first
    let _ = watcher.start(dir.path());

    let error = errors.recv_timeout(WAIT);
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    assert!(matches!(error, Ok(Error::Watch(_))), "got {error:?}");
}
