//! The inbound command processor.
//!
//! One call per queue message, terminal on first success or first failure.
//! This is the outermost error boundary for inbound commands: every failure
//! is contained to its message, logged, and recorded in the ledger -- no
//! exception ever escapes to the listener loop.

use std::sync::Arc;

use tracing::{debug, error};

use casework_types::envelope::{ACTION_HEADER, ENTITIES_HEADER, Envelope, MESSAGE_ID_HEADER};
use casework_types::error::DispatchError;
use casework_types::module::is_valid_module_name;
use casework_types::status::ProcessingStatus;

use crate::dispatch::group::ActionTable;
use crate::ledger::ProcessingStatusLedger;
use crate::module::ModuleRegistry;

/// Routes inbound commands to the static action table, falling back to the
/// hot-loaded module registry for namespaces the table does not know.
pub struct IncomingProcessor<L> {
    actions: ActionTable,
    registry: Arc<ModuleRegistry>,
    ledger: Arc<L>,
}

impl<L: ProcessingStatusLedger> IncomingProcessor<L> {
    /// Build a processor over the given table, registry, and ledger.
    pub fn new(actions: ActionTable, registry: Arc<ModuleRegistry>, ledger: Arc<L>) -> Self {
        Self {
            actions,
            registry,
            ledger,
        }
    }

    /// Process one command envelope.
    ///
    /// Returns `true` iff no error occurred. Exactly one ledger record is
    /// appended either way, carrying the original header map.
    pub async fn process(&self, envelope: &Envelope) -> bool {
        let message_id = envelope.message_id().map(str::to_string);

        match self.route(envelope).await {
            Ok(result) => {
                debug!(
                    message_id = message_id.as_deref().unwrap_or("-"),
                    result = %result,
                    "command processed"
                );
                let record = ProcessingStatus::ok(message_id, &envelope.headers);
                if let Err(err) = self.ledger.append(&record).await {
                    error!(error = %err, "failed to append ok status record");
                }
                true
            }
            Err(err) => {
                error!(
                    error_class = err.class(),
                    error = %err,
                    headers = ?envelope.headers,
                    "command processing failed"
                );
                let record = ProcessingStatus::error(
                    message_id,
                    &envelope.headers,
                    err.class(),
                    err.to_string(),
                );
                if let Err(append_err) = self.ledger.append(&record).await {
                    error!(error = %append_err, "failed to append error status record");
                }
                false
            }
        }
    }

    /// The per-message state machine: headers, body, namespace, operation.
    async fn route(&self, envelope: &Envelope) -> Result<serde_json::Value, DispatchError> {
        envelope
            .message_id()
            .ok_or(DispatchError::MissingHeader(MESSAGE_ID_HEADER))?;
        let entities = envelope
            .entities()
            .ok_or(DispatchError::MissingHeader(ENTITIES_HEADER))?;
        let action = envelope
            .action()
            .ok_or(DispatchError::MissingHeader(ACTION_HEADER))?;

        // Namespace and operation names are snake_case on this side of the
        // wire; dashes from other naming conventions are folded.
        let group_name = entities.replace('-', "_");
        let operation = action.replace('-', "_");

        let body = envelope
            .body_json()
            .map_err(|e| DispatchError::MalformedBody(e.to_string()))?;

        if let Some(group) = self.actions.get(&group_name) {
            return group.invoke(&operation, &body).await;
        }

        // Not a built-in group: the namespace may address a hot-loaded
        // module. An unloadable module surfaces as a routing error for this
        // message only; the next message re-attempts the load.
        if !is_valid_module_name(&group_name) {
            return Err(DispatchError::UnknownGroup(group_name));
        }
        match self.registry.resolve(&group_name).await {
            Some(module) => Ok(module.invoke(&operation, &body).await?),
            None => Err(DispatchError::ModuleUnavailable(group_name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use casework_types::error::{InvokeError, ModuleLoadError};
    use casework_types::module::ModuleVersion;
    use casework_types::status::ProcessingOutcome;

    use crate::dispatch::group::ActionGroup;
    use crate::ledger::MemoryStatusLedger;
    use crate::module::contract::{BoxLogicModule, LogicModule, ModuleLoader};
    use crate::module::scanner::ModuleScanner;

    use super::*;

    /// Action group that counts invocations and echoes its input.
    struct CountingGroup {
        invocations: Arc<AtomicUsize>,
    }

    impl ActionGroup for CountingGroup {
        fn name(&self) -> &'static str {
            "cases"
        }

        async fn invoke(
            &self,
            operation: &str,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, DispatchError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match operation {
                "create" | "bulk_create" => Ok(serde_json::json!({ "created": body })),
                "explode" => Err(DispatchError::Internal("boom".to_string())),
                other => Err(DispatchError::UnknownOperation {
                    group: "cases".to_string(),
                    operation: other.to_string(),
                }),
            }
        }
    }

    struct EchoModule {
        name: String,
        invocations: Arc<AtomicUsize>,
    }

    impl LogicModule for EchoModule {
        fn name(&self) -> &str {
            &self.name
        }

        fn handles_replies(&self) -> bool {
            false
        }

        async fn on_load(&self) -> Result<(), InvokeError> {
            Ok(())
        }

        async fn on_unload(&self) -> Result<(), InvokeError> {
            Ok(())
        }

        async fn invoke(
            &self,
            operation: &str,
            _body: &serde_json::Value,
        ) -> Result<serde_json::Value, InvokeError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "module_op": operation }))
        }

        async fn handle_reply(&self, _envelope: &Envelope) -> Result<bool, InvokeError> {
            Ok(false)
        }
    }

    struct EchoLoader {
        invocations: Arc<AtomicUsize>,
    }

    impl ModuleLoader for EchoLoader {
        async fn load(
            &self,
            name: &str,
            _version: &ModuleVersion,
            _dir: &Path,
        ) -> Result<BoxLogicModule, ModuleLoadError> {
            Ok(BoxLogicModule::new(EchoModule {
                name: name.to_string(),
                invocations: self.invocations.clone(),
            }))
        }
    }

    struct Fixture {
        processor: IncomingProcessor<MemoryStatusLedger>,
        ledger: Arc<MemoryStatusLedger>,
        group_invocations: Arc<AtomicUsize>,
        module_invocations: Arc<AtomicUsize>,
        _root: tempfile::TempDir,
    }

    fn make_fixture(module_dirs: &[(&str, &str)]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        for (name, version) in module_dirs {
            std::fs::create_dir_all(
                root.path().join(format!("{name}-{version}")).join("lib"),
            )
            .unwrap();
        }

        let group_invocations = Arc::new(AtomicUsize::new(0));
        let module_invocations = Arc::new(AtomicUsize::new(0));

        let scanner = Arc::new(ModuleScanner::new(root.path()));
        scanner.scan();
        let registry = Arc::new(ModuleRegistry::new(
            scanner,
            EchoLoader {
                invocations: module_invocations.clone(),
            },
        ));

        let mut actions = ActionTable::new();
        actions.register(CountingGroup {
            invocations: group_invocations.clone(),
        });

        let ledger = Arc::new(MemoryStatusLedger::new());
        let processor = IncomingProcessor::new(actions, registry, ledger.clone());

        Fixture {
            processor,
            ledger,
            group_invocations,
            module_invocations,
            _root: root,
        }
    }

    fn envelope(pairs: &[(&str, &str)], body: &str) -> Envelope {
        let headers: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Envelope::new(headers, body.as_bytes().to_vec())
    }

    fn command(entities: &str, action: &str, body: &str) -> Envelope {
        envelope(
            &[
                (MESSAGE_ID_HEADER, "msg-1"),
                (ENTITIES_HEADER, entities),
                (ACTION_HEADER, action),
            ],
            body,
        )
    }

    #[tokio::test]
    async fn valid_command_yields_exactly_one_ok_record() {
        let fixture = make_fixture(&[]);
        let envelope = command("cases", "create", r#"{"type":"test"}"#);

        assert!(fixture.processor.process(&envelope).await);

        let records = fixture.ledger.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ProcessingOutcome::Ok);
        assert_eq!(records[0].message_id.as_deref(), Some("msg-1"));
        // The record's header map equals the original.
        assert_eq!(records[0].headers, envelope.headers_json());
        assert_eq!(fixture.group_invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_message_id_is_fatal_without_invocation() {
        let fixture = make_fixture(&[]);
        let envelope = envelope(
            &[(ENTITIES_HEADER, "cases"), (ACTION_HEADER, "create")],
            "{}",
        );

        assert!(!fixture.processor.process(&envelope).await);

        let records = fixture.ledger.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ProcessingOutcome::Error);
        assert_eq!(records[0].error_class.as_deref(), Some("MissingHeader"));
        assert!(records[0].message_id.is_none());
        assert_eq!(fixture.group_invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_entities_is_fatal_without_invocation() {
        let fixture = make_fixture(&[]);
        let envelope = envelope(
            &[(MESSAGE_ID_HEADER, "msg-1"), (ACTION_HEADER, "create")],
            "{}",
        );

        assert!(!fixture.processor.process(&envelope).await);
        assert_eq!(fixture.group_invocations.load(Ordering::SeqCst), 0);
        assert_eq!(
            fixture.ledger.all()[0].error_class.as_deref(),
            Some("MissingHeader")
        );
    }

    #[tokio::test]
    async fn missing_action_is_fatal_without_invocation() {
        let fixture = make_fixture(&[]);
        let envelope = envelope(
            &[(MESSAGE_ID_HEADER, "msg-1"), (ENTITIES_HEADER, "cases")],
            "{}",
        );

        assert!(!fixture.processor.process(&envelope).await);
        assert_eq!(fixture.group_invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_body_is_fatal_without_invocation() {
        let fixture = make_fixture(&[]);
        let envelope = command("cases", "create", "{not json");

        assert!(!fixture.processor.process(&envelope).await);

        let records = fixture.ledger.all();
        assert_eq!(records[0].error_class.as_deref(), Some("MalformedBody"));
        assert_eq!(fixture.group_invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn group_failure_is_contained_and_recorded() {
        let fixture = make_fixture(&[]);
        let envelope = command("cases", "explode", "{}");

        assert!(!fixture.processor.process(&envelope).await);

        let records = fixture.ledger.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ProcessingOutcome::Error);
        assert_eq!(records[0].error_class.as_deref(), Some("InternalError"));
        assert!(records[0].error_text.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn unknown_namespace_is_a_routing_error() {
        let fixture = make_fixture(&[]);
        let envelope = command("NoSuchGroup", "create", "{}");

        assert!(!fixture.processor.process(&envelope).await);
        assert_eq!(
            fixture.ledger.all()[0].error_class.as_deref(),
            Some("UnknownGroup")
        );
    }

    #[tokio::test]
    async fn module_namespace_falls_back_to_the_registry() {
        let fixture = make_fixture(&[("ingest", "0.1.0")]);
        let envelope = command("ingest", "absorb", r#"{"payload": 1}"#);

        assert!(fixture.processor.process(&envelope).await);
        assert_eq!(fixture.module_invocations.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.ledger.all()[0].outcome, ProcessingOutcome::Ok);
    }

    #[tokio::test]
    async fn unloadable_module_surfaces_as_routing_error() {
        let fixture = make_fixture(&[]);
        let envelope = command("ingest", "absorb", "{}");

        assert!(!fixture.processor.process(&envelope).await);
        assert_eq!(
            fixture.ledger.all()[0].error_class.as_deref(),
            Some("ModuleUnavailable")
        );
    }

    #[tokio::test]
    async fn dashed_action_names_fold_to_snake_case() {
        let fixture = make_fixture(&[]);
        let dashed = command("cases", "bulk-create", r#"{"type":"test"}"#);

        assert!(fixture.processor.process(&dashed).await);
        assert_eq!(fixture.group_invocations.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.ledger.all()[0].outcome, ProcessingOutcome::Ok);
    }
}
