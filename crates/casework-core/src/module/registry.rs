//! The module registry: cache and lifecycle manager for loaded modules.
//!
//! The registry owns the only piece of mutable shared state in the dispatch
//! core. All load/unload work is serialized through a single async lock, so
//! there is at most one load in flight and every caller sees a consistent
//! answer to "is the cached version the freshest". Loading is lazy: a module
//! is (re)loaded when `resolve` observes a version mismatch against the
//! scanner, and every failed load is retried on the next call -- the scanner
//! only reports a new version when the filesystem actually changed, so there
//! is no negative cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use casework_types::module::is_valid_module_name;

use super::contract::{BoxLogicModule, ModuleInfo};
use super::contract::ModuleLoaderDyn;
use super::scanner::ModuleScanner;

/// Cache and lifecycle manager for hot-loaded logic modules.
///
/// Constructed once at startup and shared by `Arc` with the scanner watch
/// task and both processors -- there is no process-wide singleton.
pub struct ModuleRegistry {
    scanner: Arc<ModuleScanner>,
    loader: Box<dyn ModuleLoaderDyn>,
    /// name -> loaded module. A key is present iff the module is currently
    /// loaded and usable. A BTreeMap keeps the enumeration order of
    /// `loaded_modules` stable (by name) for the reply broadcast path.
    cache: Mutex<BTreeMap<String, ModuleInfo>>,
}

impl ModuleRegistry {
    /// Create a registry over the given scanner and loader.
    pub fn new(scanner: Arc<ModuleScanner>, loader: impl ModuleLoaderDyn + 'static) -> Self {
        Self {
            scanner,
            loader: Box::new(loader),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Resolve `name` to its currently loaded module, loading or reloading
    /// first when the scanner reports a different latest version.
    ///
    /// Returns `None` when no version exists on disk or the load failed --
    /// never an error. The old cache entry is removed *before* the new load
    /// is attempted, so a failed reload leaves the module unloaded rather
    /// than serving stale code.
    pub async fn resolve(&self, name: &str) -> Option<BoxLogicModule> {
        if !is_valid_module_name(name) {
            return None;
        }

        let mut cache = self.cache.lock().await;
        let latest = self.scanner.latest_version(name);

        let Some(latest) = latest else {
            // Nothing on disk. Drop whatever was loaded.
            if let Some(info) = cache.remove(name) {
                info!(module = %name, version = %info.version, "module gone from disk, unloading");
                run_unload_hook(name, &info.handle).await;
            }
            return None;
        };

        match cache.get(name) {
            Some(info) if info.version == latest => return Some(info.handle.clone()),
            Some(_) => {
                // Stale version: unload first. This intentionally happens
                // before the load attempt, so a failing load leaves the
                // module absent.
                if let Some(info) = cache.remove(name) {
                    info!(
                        module = %name,
                        old_version = %info.version,
                        new_version = %latest,
                        "reloading module"
                    );
                    run_unload_hook(name, &info.handle).await;
                }
            }
            None => {}
        }

        let dir = self.scanner.module_dir(name, &latest);
        match self.loader.load_boxed(name, &latest, &dir).await {
            Ok(handle) => {
                // A failing on_load counts as a failed load: the entry
                // stays absent and the next resolve re-attempts. The error
                // itself is contained here, never raised to the caller.
                if let Err(err) = handle.on_load().await {
                    warn!(
                        module = %name,
                        version = %latest,
                        error = %err,
                        "on_load hook failed, leaving module unloaded"
                    );
                    return None;
                }
                info!(module = %name, version = %latest, "module loaded");
                let info = ModuleInfo::new(latest, handle.clone());
                cache.insert(name.to_string(), info);
                Some(handle)
            }
            Err(err) => {
                warn!(
                    module = %name,
                    version = %latest,
                    error = %err,
                    "module load failed, reporting unavailable"
                );
                None
            }
        }
    }

    /// Snapshot of every loaded module handle, in arbitrary order.
    pub async fn loaded_modules(&self) -> Vec<BoxLogicModule> {
        self.cache
            .lock()
            .await
            .values()
            .map(|info| info.handle.clone())
            .collect()
    }

    /// Snapshot of loaded module names and versions, for diagnostics.
    pub async fn loaded_versions(&self) -> Vec<(String, String)> {
        self.cache
            .lock()
            .await
            .iter()
            .map(|(name, info)| (name.clone(), info.version.to_string()))
            .collect()
    }

    /// Unload `name`, running its `on_unload` hook best-effort. No-op when
    /// nothing was loaded.
    pub async fn unload(&self, name: &str) {
        let removed = self.cache.lock().await.remove(name);
        match removed {
            Some(info) => {
                info!(module = %name, version = %info.version, "module unloaded");
                run_unload_hook(name, &info.handle).await;
            }
            None => debug!(module = %name, "unload requested for module that is not loaded"),
        }
    }

    /// Unload everything, re-scan the module root, and eagerly load every
    /// discovered module.
    pub async fn reload_all(&self) {
        let drained = std::mem::take(&mut *self.cache.lock().await);
        for (name, info) in &drained {
            run_unload_hook(name, &info.handle).await;
        }

        self.scanner.scan();
        let discovered = self.scanner.all();
        info!(count = discovered.len(), "eagerly loading discovered modules");
        for name in discovered.keys() {
            self.resolve(name).await;
        }
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("root", &self.scanner.root())
            .finish()
    }
}

/// Run `on_unload`, swallowing failures into a warn log.
async fn run_unload_hook(name: &str, handle: &BoxLogicModule) {
    if let Err(err) = handle.on_unload().await {
        warn!(module = %name, error = %err, "on_unload hook failed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
