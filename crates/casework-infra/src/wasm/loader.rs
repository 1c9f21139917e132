//! WASM logic-module loader and the per-invocation execution wrapper.
//!
//! Implements the core `ModuleLoader` port: reads the optional
//! `module.yaml` manifest, checks its host requirement, compiles
//! `lib/{name}.wasm` into a component, and wraps it in [`WasmLogicModule`].
//! Every call into the module gets a **fresh** [`Store`] with its own fuel
//! and memory accounting, so state never leaks between invocations and a
//! runaway module cannot starve the process.

use std::path::Path;
use std::sync::Arc;

use casework_core::module::contract::{BoxLogicModule, LogicModule, ModuleLoader};
use casework_types::envelope::Envelope;
use casework_types::error::{InvokeError, ModuleLoadError};
use casework_types::module::{ModuleManifest, ModuleVersion};
use wasmtime::component::{Component, HasSelf, Linker, ResourceTable};
use wasmtime::{ResourceLimiter, Store};
use wasmtime_wasi::{WasiCtx, WasiCtxBuilder, WasiCtxView, WasiView};

use super::runtime::{self, MAX_FUEL, MAX_MEMORY_BYTES, ModuleRuntime, casework::module::host};

// ---------------------------------------------------------------------------
// ModuleState -- per-invocation Store data
// ---------------------------------------------------------------------------

/// Data attached to each Wasmtime [`Store`] for a single module invocation.
struct ModuleState {
    ctx: WasiCtx,
    table: ResourceTable,
    module_name: String,
    max_memory_bytes: usize,
}

impl WasiView for ModuleState {
    fn ctx(&mut self) -> WasiCtxView<'_> {
        WasiCtxView {
            ctx: &mut self.ctx,
            table: &mut self.table,
        }
    }
}

impl ResourceLimiter for ModuleState {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.max_memory_bytes {
            tracing::warn!(
                module = %self.module_name,
                current_bytes = current,
                desired_bytes = desired,
                limit_bytes = self.max_memory_bytes,
                "memory growth denied by ResourceLimiter"
            );
            Ok(false)
        } else {
            Ok(true)
        }
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        // Cap table entries at 1000 to limit resource abuse.
        Ok(desired <= 1000)
    }
}

impl host::Host for ModuleState {
    fn log(&mut self, level: String, message: String) {
        match level.as_str() {
            "error" => tracing::error!(module = %self.module_name, "{}", message),
            "warn" => tracing::warn!(module = %self.module_name, "{}", message),
            "info" => tracing::info!(module = %self.module_name, "{}", message),
            "debug" => tracing::debug!(module = %self.module_name, "{}", message),
            _ => tracing::trace!(module = %self.module_name, level = %level, "{}", message),
        }
    }
}

// ---------------------------------------------------------------------------
// WasmLogicModule
// ---------------------------------------------------------------------------

/// A compiled logic module invoked through fresh per-call stores.
pub struct WasmLogicModule {
    name: String,
    version: String,
    manifest: Option<ModuleManifest>,
    runtime: Arc<ModuleRuntime>,
    component: Component,
    linker: Linker<ModuleState>,
}

impl WasmLogicModule {
    /// Instantiate the component in a fresh store.
    async fn instantiate(
        &self,
    ) -> Result<(Store<ModuleState>, runtime::DispatchModule), InvokeError> {
        let state = ModuleState {
            ctx: WasiCtxBuilder::new().build(),
            table: ResourceTable::new(),
            module_name: self.name.clone(),
            max_memory_bytes: MAX_MEMORY_BYTES,
        };

        let mut store = Store::new(self.runtime.engine(), state);
        store
            .set_fuel(MAX_FUEL)
            .map_err(|e| InvokeError::Failed(format!("failed to set fuel: {e}")))?;
        store.limiter(|state| state);

        let instance = self
            .linker
            .instantiate_async(&mut store, &self.component)
            .await
            .map_err(|e| InvokeError::Failed(format!("instantiation failed: {e}")))?;
        let bindings = runtime::DispatchModule::new(&mut store, &instance)
            .map_err(|e| InvokeError::Failed(format!("binding failed: {e}")))?;

        Ok((store, bindings))
    }
}

impl LogicModule for WasmLogicModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles_replies(&self) -> bool {
        self.manifest
            .as_ref()
            .map(|m| m.handles_replies)
            .unwrap_or(false)
    }

    async fn on_load(&self) -> Result<(), InvokeError> {
        let (mut store, bindings) = self.instantiate().await?;
        bindings
            .call_on_load(&mut store)
            .await
            .map_err(|e| InvokeError::Failed(format!("on-load trapped: {e}")))?
            .map_err(InvokeError::Failed)
    }

    async fn on_unload(&self) -> Result<(), InvokeError> {
        let (mut store, bindings) = self.instantiate().await?;
        bindings
            .call_on_unload(&mut store)
            .await
            .map_err(|e| InvokeError::Failed(format!("on-unload trapped: {e}")))?
            .map_err(InvokeError::Failed)
    }

    async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, InvokeError> {
        // Modules with a manifest only serve their declared operations.
        if let Some(manifest) = &self.manifest {
            if !manifest.operations.is_empty()
                && !manifest.operations.iter().any(|op| op == operation)
            {
                return Err(InvokeError::UnknownOperation(operation.to_string()));
            }
        }

        tracing::debug!(
            module = %self.name,
            version = %self.version,
            operation = %operation,
            "invoking module operation"
        );

        let body_text = body.to_string();
        let (mut store, bindings) = self.instantiate().await?;
        let output = bindings
            .call_invoke(&mut store, operation, &body_text)
            .await
            .map_err(|e| InvokeError::Failed(format!("invoke trapped: {e}")))?
            .map_err(InvokeError::Failed)?;

        serde_json::from_str(&output)
            .map_err(|e| InvokeError::Failed(format!("module returned invalid JSON: {e}")))
    }

    async fn handle_reply(&self, envelope: &Envelope) -> Result<bool, InvokeError> {
        let payload = serde_json::json!({
            "headers": envelope.headers,
            "body": String::from_utf8_lossy(&envelope.body),
        })
        .to_string();

        let (mut store, bindings) = self.instantiate().await?;
        bindings
            .call_handle_reply(&mut store, &payload)
            .await
            .map_err(|e| InvokeError::Failed(format!("handle-reply trapped: {e}")))?
            .map_err(InvokeError::Failed)
    }
}

// ---------------------------------------------------------------------------
// WasmModuleLoader
// ---------------------------------------------------------------------------

/// Loads versioned module directories into [`WasmLogicModule`] handles.
pub struct WasmModuleLoader {
    runtime: Arc<ModuleRuntime>,
    host_version: semver::Version,
}

impl WasmModuleLoader {
    /// Create a loader over the given runtime, identifying the host by the
    /// service's crate version for manifest compatibility checks.
    pub fn new(runtime: Arc<ModuleRuntime>, host_version: semver::Version) -> Self {
        Self {
            runtime,
            host_version,
        }
    }

    fn build_linker(&self) -> anyhow::Result<Linker<ModuleState>> {
        let mut linker: Linker<ModuleState> = Linker::new(self.runtime.engine());
        wasmtime_wasi::p2::add_to_linker_async(&mut linker)?;
        host::add_to_linker::<ModuleState, HasSelf<ModuleState>>(&mut linker, |state| state)?;
        Ok(linker)
    }

    async fn read_manifest(&self, dir: &Path) -> Result<Option<ModuleManifest>, ModuleLoadError> {
        let manifest_path = dir.join("module.yaml");
        match tokio::fs::read_to_string(&manifest_path).await {
            Ok(text) => {
                let manifest = ModuleManifest::from_yaml(&text)
                    .map_err(|e| ModuleLoadError::Manifest(e.to_string()))?;
                Ok(Some(manifest))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ModuleLoadError::Io(err.to_string())),
        }
    }
}

impl ModuleLoader for WasmModuleLoader {
    async fn load(
        &self,
        name: &str,
        version: &ModuleVersion,
        dir: &Path,
    ) -> Result<BoxLogicModule, ModuleLoadError> {
        let manifest = self.read_manifest(dir).await?;

        if let Some(manifest) = &manifest {
            match manifest.host_compatible(&self.host_version) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ModuleLoadError::Incompatible {
                        required: manifest.host.clone().unwrap_or_default(),
                        running: self.host_version.to_string(),
                    });
                }
                Err(err) => {
                    return Err(ModuleLoadError::Manifest(format!(
                        "invalid host requirement: {err}"
                    )));
                }
            }
        }

        let wasm_path = dir.join("lib").join(format!("{name}.wasm"));
        let wasm_bytes = match tokio::fs::read(&wasm_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModuleLoadError::MissingEntry(
                    wasm_path.display().to_string(),
                ));
            }
            Err(err) => return Err(ModuleLoadError::Io(err.to_string())),
        };

        let component = self
            .runtime
            .load_component(&wasm_bytes)
            .map_err(|e| ModuleLoadError::InvalidComponent(e.to_string()))?;
        let linker = self
            .build_linker()
            .map_err(|e| ModuleLoadError::InvalidComponent(e.to_string()))?;

        tracing::debug!(module = %name, version = %version, "compiled module component");

        Ok(BoxLogicModule::new(WasmLogicModule {
            name: name.to_string(),
            version: version.to_string(),
            manifest,
            runtime: self.runtime.clone(),
            component,
            linker,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
