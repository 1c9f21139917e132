//! The contract a hot-loaded logic module implements, and the loader port
//! that produces module handles from versioned directories on disk.
//!
//! `LogicModule` uses native async fn in traits (RPITIT), so it cannot be a
//! trait object directly. `LogicModuleDyn` is the object-safe mirror with
//! boxed futures and a blanket impl; `BoxLogicModule` wraps it with ergonomic
//! methods. Follows the same blanket-impl pattern throughout the workspace.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use casework_types::envelope::Envelope;
use casework_types::error::{InvokeError, ModuleLoadError};
use casework_types::module::ModuleVersion;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// LogicModule contract
// ---------------------------------------------------------------------------

/// A loaded business-logic module.
///
/// Modules are versioned units of domain behavior discovered on disk and
/// invoked by the dispatch pipeline. The lifecycle hooks are best-effort:
/// the registry logs their failures and never propagates them.
pub trait LogicModule: Send + Sync {
    /// The module's name (the directory name before the version separator).
    fn name(&self) -> &str;

    /// Whether the module exposes the reply-handler operation.
    ///
    /// An explicit capability query -- the response processor checks this
    /// before invoking [`LogicModule::handle_reply`], so absence of the
    /// handler is never an error.
    fn handles_replies(&self) -> bool;

    /// Lifecycle hook invoked once after a successful load.
    fn on_load(&self) -> impl Future<Output = Result<(), InvokeError>> + Send;

    /// Lifecycle hook invoked once before the module is dropped from the
    /// registry.
    fn on_unload(&self) -> impl Future<Output = Result<(), InvokeError>> + Send;

    /// Invoke a named operation with a JSON body.
    fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, InvokeError>> + Send;

    /// Offer a reply envelope to the module. `Ok(true)` means accepted.
    fn handle_reply(
        &self,
        envelope: &Envelope,
    ) -> impl Future<Output = Result<bool, InvokeError>> + Send;
}

/// Object-safe version of [`LogicModule`] with boxed futures.
pub trait LogicModuleDyn: Send + Sync {
    fn name(&self) -> &str;

    fn handles_replies(&self) -> bool;

    fn on_load_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), InvokeError>> + Send + 'a>>;

    fn on_unload_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), InvokeError>> + Send + 'a>>;

    fn invoke_boxed<'a>(
        &'a self,
        operation: &'a str,
        body: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, InvokeError>> + Send + 'a>>;

    fn handle_reply_boxed<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<bool, InvokeError>> + Send + 'a>>;
}

/// Blanket implementation: any `LogicModule` automatically implements
/// `LogicModuleDyn`.
impl<T: LogicModule> LogicModuleDyn for T {
    fn name(&self) -> &str {
        LogicModule::name(self)
    }

    fn handles_replies(&self) -> bool {
        LogicModule::handles_replies(self)
    }

    fn on_load_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), InvokeError>> + Send + 'a>> {
        Box::pin(self.on_load())
    }

    fn on_unload_boxed<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), InvokeError>> + Send + 'a>> {
        Box::pin(self.on_unload())
    }

    fn invoke_boxed<'a>(
        &'a self,
        operation: &'a str,
        body: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, InvokeError>> + Send + 'a>> {
        Box::pin(self.invoke(operation, body))
    }

    fn handle_reply_boxed<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<bool, InvokeError>> + Send + 'a>> {
        Box::pin(self.handle_reply(envelope))
    }
}

/// Type-erased, cheaply clonable module handle.
///
/// The registry hands these out; cloning shares the underlying module.
#[derive(Clone)]
pub struct BoxLogicModule {
    inner: Arc<dyn LogicModuleDyn>,
}

impl BoxLogicModule {
    /// Wrap a concrete `LogicModule` in a type-erased handle.
    pub fn new<T: LogicModule + 'static>(module: T) -> Self {
        Self {
            inner: Arc::new(module),
        }
    }

    /// The module's name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Whether the module exposes the reply-handler operation.
    pub fn handles_replies(&self) -> bool {
        self.inner.handles_replies()
    }

    /// Run the post-load lifecycle hook.
    pub async fn on_load(&self) -> Result<(), InvokeError> {
        self.inner.on_load_boxed().await
    }

    /// Run the pre-unload lifecycle hook.
    pub async fn on_unload(&self) -> Result<(), InvokeError> {
        self.inner.on_unload_boxed().await
    }

    /// Invoke a named operation with a JSON body.
    pub async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, InvokeError> {
        self.inner.invoke_boxed(operation, body).await
    }

    /// Offer a reply envelope to the module.
    pub async fn handle_reply(&self, envelope: &Envelope) -> Result<bool, InvokeError> {
        self.inner.handle_reply_boxed(envelope).await
    }
}

impl std::fmt::Debug for BoxLogicModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLogicModule")
            .field("name", &self.inner.name())
            .field("handles_replies", &self.inner.handles_replies())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ModuleInfo
// ---------------------------------------------------------------------------

/// A registry cache entry: version, handle, and load timestamp.
///
/// Immutable once constructed; a reload replaces the entry wholesale, it is
/// never mutated in place.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub version: ModuleVersion,
    pub handle: BoxLogicModule,
    pub loaded_at: DateTime<Utc>,
}

impl ModuleInfo {
    /// Build an entry for a freshly loaded module.
    pub fn new(version: ModuleVersion, handle: BoxLogicModule) -> Self {
        Self {
            version,
            handle,
            loaded_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ModuleLoader port
// ---------------------------------------------------------------------------

/// Port for loading one module version from its directory on disk.
///
/// The infrastructure layer implements this with the Wasmtime component
/// host; tests implement it with in-memory stubs.
pub trait ModuleLoader: Send + Sync {
    /// Load the module `name` at `version` from `dir`.
    fn load(
        &self,
        name: &str,
        version: &ModuleVersion,
        dir: &Path,
    ) -> impl Future<Output = Result<BoxLogicModule, ModuleLoadError>> + Send;
}

/// Object-safe version of [`ModuleLoader`] with a boxed future.
pub trait ModuleLoaderDyn: Send + Sync {
    fn load_boxed<'a>(
        &'a self,
        name: &'a str,
        version: &'a ModuleVersion,
        dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<BoxLogicModule, ModuleLoadError>> + Send + 'a>>;
}

/// Blanket implementation: any `ModuleLoader` automatically implements
/// `ModuleLoaderDyn`.
impl<T: ModuleLoader> ModuleLoaderDyn for T {
    fn load_boxed<'a>(
        &'a self,
        name: &'a str,
        version: &'a ModuleVersion,
        dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<BoxLogicModule, ModuleLoadError>> + Send + 'a>> {
        Box::pin(self.load(name, version, dir))
    }
}
