//! The action-group contract and the static dispatch table.
//!
//! Action groups are the fixed, build-time set of command namespaces the
//! incoming processor routes to (cases, documents, requests,
//! processing_statuses, version). They are distinct from hot-loaded modules:
//! the table never changes while the process runs.
//!
//! `ActionGroup` uses native async fn in traits; `ActionGroupDyn` is the
//! object-safe mirror with boxed futures and a blanket impl, and
//! `BoxActionGroup` wraps it -- the same pattern as the module contract.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use casework_types::error::DispatchError;

/// One build-time command namespace.
pub trait ActionGroup: Send + Sync {
    /// The namespace name the `x_entities` header routes on.
    fn name(&self) -> &'static str;

    /// Invoke a named operation with a JSON body.
    fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, DispatchError>> + Send;
}

/// Object-safe version of [`ActionGroup`] with a boxed future.
pub trait ActionGroupDyn: Send + Sync {
    fn name(&self) -> &'static str;

    fn invoke_boxed<'a>(
        &'a self,
        operation: &'a str,
        body: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, DispatchError>> + Send + 'a>>;
}

/// Blanket implementation: any `ActionGroup` automatically implements
/// `ActionGroupDyn`.
impl<T: ActionGroup> ActionGroupDyn for T {
    fn name(&self) -> &'static str {
        ActionGroup::name(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        operation: &'a str,
        body: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, DispatchError>> + Send + 'a>> {
        Box::pin(self.invoke(operation, body))
    }
}

/// Type-erased action group held by the table.
pub struct BoxActionGroup {
    inner: Box<dyn ActionGroupDyn>,
}

impl BoxActionGroup {
    /// Wrap a concrete `ActionGroup`.
    pub fn new<T: ActionGroup + 'static>(group: T) -> Self {
        Self {
            inner: Box::new(group),
        }
    }

    /// The namespace name.
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Invoke a named operation with a JSON body.
    pub async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        self.inner.invoke_boxed(operation, body).await
    }
}

/// The static namespace -> group table.
///
/// Built once at startup; lookups never observe changes afterwards.
#[derive(Default)]
pub struct ActionTable {
    groups: HashMap<&'static str, BoxActionGroup>,
}

impl ActionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group under its own name, replacing any previous entry.
    pub fn register(&mut self, group: impl ActionGroup + 'static) {
        let boxed = BoxActionGroup::new(group);
        self.groups.insert(boxed.name(), boxed);
    }

    /// Look up a group by namespace name. Case-sensitive.
    pub fn get(&self, name: &str) -> Option<&BoxActionGroup> {
        self.groups.get(name)
    }

    /// The registered namespace names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.groups.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTable")
            .field("groups", &self.names())
            .finish()
    }
}
