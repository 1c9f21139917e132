//! Module directory scanner.
//!
//! Watches a root directory for versioned module subdirectories
//! (`name-version`) and answers "what is the latest version of each module".
//! Discovery state is rebuilt wholesale on each pass; a debounced filesystem
//! watcher plus a fallback re-scan interval bound how stale the answer can
//! be. The scanner never invokes the registry -- it only reports versions
//! and emits change notifications an owning supervisor acts on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

// Use notify types re-exported through notify-debouncer-mini so the watcher
// and debouncer agree on the notify version.
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use casework_types::module::{ModuleVersion, split_versioned_dir};

/// Buffer for change-notification batches sent to the supervisor.
const CHANGE_BUFFER: usize = 64;

/// What happened to a module between two scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanChangeKind {
    /// The module appeared for the first time.
    Appeared,
    /// The module's latest version changed.
    Changed,
    /// No version of the module remains on disk.
    Removed,
}

/// A single module-level difference between two scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanChange {
    pub name: String,
    pub kind: ScanChangeKind,
}

/// Scans `root` for `name-version` module directories.
pub struct ModuleScanner {
    root: PathBuf,
    discovered: RwLock<HashMap<String, ModuleVersion>>,
}

impl ModuleScanner {
    /// Create a scanner over `root`. No scan happens until [`Self::scan`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            discovered: RwLock::new(HashMap::new()),
        }
    }

    /// The scanned root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the discovery map from the directory listing and return the
    /// changes relative to the previous pass.
    ///
    /// Directories whose names fail the `name-version` pattern are ignored,
    /// as are plain files. When two directories exist for the same module,
    /// the higher version wins. A missing root scans to empty.
    pub fn scan(&self) -> Vec<ScanChange> {
        let fresh = self.read_directory();

        let mut discovered = self
            .discovered
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let changes = diff_snapshots(&discovered, &fresh);
        *discovered = fresh;
        changes
    }

    /// The latest discovered version of `name`, if any.
    pub fn latest_version(&self, name: &str) -> Option<ModuleVersion> {
        self.discovered
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Snapshot of every discovered module and its latest version.
    pub fn all(&self) -> HashMap<String, ModuleVersion> {
        self.discovered
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The directory holding `name` at `version`.
    pub fn module_dir(&self, name: &str, version: &ModuleVersion) -> PathBuf {
        self.root.join(format!("{name}-{version}"))
    }

    fn read_directory(&self) -> HashMap<String, ModuleVersion> {
        let mut latest: HashMap<String, ModuleVersion> = HashMap::new();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(
                    root = %self.root.display(),
                    error = %err,
                    "module root not readable, scanning to empty"
                );
                return latest;
            }
        };

        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let file_name = entry.file_name();
            let Some(dir_name) = file_name.to_str() else {
                continue;
            };
            let Some((name, version)) = split_versioned_dir(dir_name) else {
                continue;
            };

            match latest.get(&name) {
                Some(existing) if *existing >= version => {}
                _ => {
                    latest.insert(name, version);
                }
            }
        }

        latest
    }
}

/// Compare two discovery snapshots module by module.
fn diff_snapshots(
    old: &HashMap<String, ModuleVersion>,
    new: &HashMap<String, ModuleVersion>,
) -> Vec<ScanChange> {
    let mut changes = Vec::new();

    for (name, version) in new {
        match old.get(name) {
            None => changes.push(ScanChange {
                name: name.clone(),
                kind: ScanChangeKind::Appeared,
            }),
            Some(previous) if previous != version => changes.push(ScanChange {
                name: name.clone(),
                kind: ScanChangeKind::Changed,
            }),
            Some(_) => {}
        }
    }

    for name in old.keys() {
        if !new.contains_key(name) {
            changes.push(ScanChange {
                name: name.clone(),
                kind: ScanChangeKind::Removed,
            });
        }
    }

    changes
}

// ---------------------------------------------------------------------------
// Watch task
// ---------------------------------------------------------------------------

/// RAII handle keeping the filesystem watcher and its re-scan task alive.
pub struct ScannerWatch {
    /// The underlying debounced watcher, when one could be started.
    _debouncer: Option<Debouncer<RecommendedWatcher>>,
}

/// Start watching the scanner's root for changes.
///
/// Returns a guard (keep alive to maintain the watch) and a receiver that
/// emits a batch of [`ScanChange`]s after every pass that found differences.
/// A debounced notify watcher triggers immediate re-scans; the
/// `rescan_interval` is the fallback bound when filesystem events are
/// unavailable (the watcher also fails soft when the root does not exist
/// yet, leaving the interval as the only trigger).
pub fn start_scanner_watch(
    scanner: std::sync::Arc<ModuleScanner>,
    debounce: Duration,
    rescan_interval: Duration,
    cancel: CancellationToken,
) -> (ScannerWatch, mpsc::Receiver<Vec<ScanChange>>) {
    let (change_tx, change_rx) = mpsc::channel::<Vec<ScanChange>>(CHANGE_BUFFER);
    let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);

    let debouncer = match new_debouncer(debounce, move |result: DebounceEventResult| {
        match result {
            // Any event in the tree warrants a re-scan; coalescing happens
            // through the single-slot tick channel.
            Ok(_) => {
                let _ = tick_tx.try_send(());
            }
            Err(err) => {
                tracing::warn!(error = %err, "module directory watcher error");
            }
        }
    }) {
        Ok(mut debouncer) => {
            match debouncer
                .watcher()
                .watch(scanner.root(), RecursiveMode::Recursive)
            {
                Ok(()) => {
                    tracing::info!(root = %scanner.root().display(), "module directory watch started");
                    Some(debouncer)
                }
                Err(err) => {
                    tracing::warn!(
                        root = %scanner.root().display(),
                        error = %err,
                        "module directory not watchable, relying on re-scan interval"
                    );
                    None
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to create module directory watcher");
            None
        }
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(rescan_interval);
        // The first tick fires immediately; the initial scan already ran at
        // startup, so consume it.
        interval.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
                Some(()) = tick_rx.recv() => {}
            }

            let changes = scanner.scan();
            if changes.is_empty() {
                continue;
            }
            tracing::debug!(count = changes.len(), "module directory changes detected");
            if change_tx.send(changes).await.is_err() {
                break;
            }
        }
    });

    (
        ScannerWatch {
            _debouncer: debouncer,
        },
        change_rx,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_module_dir(root: &Path, name: &str, version: &str) {
        let dir = root.join(format!("{name}-{version}")).join("lib");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{name}.wasm")), b"\0asm").unwrap();
    }

    #[test]
    fn scan_discovers_versioned_directories() {
        let root = tempfile::tempdir().unwrap();
        make_module_dir(root.path(), "ingest", "0.1.0");
        make_module_dir(root.path(), "audit", "1.0");

        let scanner = ModuleScanner::new(root.path());
        scanner.scan();

        assert_eq!(
            scanner.latest_version("ingest").unwrap().to_string(),
            "0.1.0"
        );
        assert_eq!(scanner.latest_version("audit").unwrap().to_string(), "1.0");
        assert_eq!(scanner.all().len(), 2);
    }

    #[test]
    fn highest_version_wins_numerically() {
        let root = tempfile::tempdir().unwrap();
        make_module_dir(root.path(), "ingest", "0.0.9");
        make_module_dir(root.path(), "ingest", "0.0.10");

        let scanner = ModuleScanner::new(root.path());
        scanner.scan();

        assert_eq!(
            scanner.latest_version("ingest").unwrap().to_string(),
            "0.0.10"
        );
    }

    #[test]
    fn removing_the_winner_falls_back_to_next_highest() {
        let root = tempfile::tempdir().unwrap();
        make_module_dir(root.path(), "ingest", "0.0.1");
        make_module_dir(root.path(), "ingest", "0.0.2");

        let scanner = ModuleScanner::new(root.path());
        scanner.scan();
        assert_eq!(
            scanner.latest_version("ingest").unwrap().to_string(),
            "0.0.2"
        );

        std::fs::remove_dir_all(root.path().join("ingest-0.0.2")).unwrap();
        let changes = scanner.scan();
        assert_eq!(
            scanner.latest_version("ingest").unwrap().to_string(),
            "0.0.1"
        );
        assert_eq!(
            changes,
            vec![ScanChange {
                name: "ingest".to_string(),
                kind: ScanChangeKind::Changed,
            }]
        );
    }

    #[test]
    fn removing_all_versions_reports_module_absent() {
        let root = tempfile::tempdir().unwrap();
        make_module_dir(root.path(), "ingest", "0.0.1");

        let scanner = ModuleScanner::new(root.path());
        scanner.scan();
        std::fs::remove_dir_all(root.path().join("ingest-0.0.1")).unwrap();

        let changes = scanner.scan();
        assert!(scanner.latest_version("ingest").is_none());
        assert_eq!(changes[0].kind, ScanChangeKind::Removed);
    }

    #[test]
    fn malformed_names_and_plain_files_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        make_module_dir(root.path(), "ingest", "0.1.0");
        std::fs::create_dir_all(root.path().join("Ingest-0.1.0")).unwrap();
        std::fs::create_dir_all(root.path().join("no_version_here")).unwrap();
        std::fs::create_dir_all(root.path().join("bad-1.x")).unwrap();
        std::fs::write(root.path().join("stray-0.1.0"), b"file, not dir").unwrap();

        let scanner = ModuleScanner::new(root.path());
        scanner.scan();

        assert_eq!(scanner.all().len(), 1);
        assert!(scanner.latest_version("ingest").is_some());
    }

    #[test]
    fn missing_root_scans_to_empty() {
        let scanner = ModuleScanner::new("/nonexistent/casework/modules");
        let changes = scanner.scan();
        assert!(changes.is_empty());
        assert!(scanner.all().is_empty());
    }

    #[test]
    fn first_scan_reports_appeared() {
        let root = tempfile::tempdir().unwrap();
        make_module_dir(root.path(), "ingest", "0.1.0");

        let scanner = ModuleScanner::new(root.path());
        let changes = scanner.scan();
        assert_eq!(
            changes,
            vec![ScanChange {
                name: "ingest".to_string(),
                kind: ScanChangeKind::Appeared,
            }]
        );

        // Unchanged second pass reports nothing.
        assert!(scanner.scan().is_empty());
    }

    #[test]
    fn module_dir_uses_name_dash_version() {
        let scanner = ModuleScanner::new("/srv/modules");
        let version: ModuleVersion = "0.2.0".parse().unwrap();
        assert_eq!(
            scanner.module_dir("ingest", &version),
            PathBuf::from("/srv/modules/ingest-0.2.0")
        );
    }

    #[tokio::test]
    async fn watch_task_emits_changes_on_interval_rescan() {
        let root = tempfile::tempdir().unwrap();
        let scanner = std::sync::Arc::new(ModuleScanner::new(root.path()));
        scanner.scan();

        let cancel = CancellationToken::new();
        let (_watch, mut rx) = start_scanner_watch(
            scanner.clone(),
            Duration::from_millis(50),
            Duration::from_millis(100),
            cancel.clone(),
        );

        make_module_dir(root.path(), "ingest", "0.1.0");

        let changes = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watch task should emit within the rescan interval")
            .expect("channel should stay open");
        assert!(changes.iter().any(|c| c.name == "ingest"));

        cancel.cancel();
    }
}
