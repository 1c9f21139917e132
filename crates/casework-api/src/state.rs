//! Application state: construction and wiring of the dispatch pipeline.
//!
//! One registry instance is built here and handed by reference to the
//! scanner watch, both processors, and the version action group --
//! dependency injection, no ambient global lookup.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use casework_core::dispatch::builtin::{
    CasesGroup, DocumentsGroup, ProcessingStatusesGroup, RequestsGroup, VersionGroup,
};
use casework_core::dispatch::{ActionTable, IncomingProcessor, ResponseProcessor};
use casework_core::module::{ModuleRegistry, ModuleScanner};
use casework_core::transport::{PublisherPool, QueueBroker};
use casework_infra::config::load_service_config;
use casework_infra::sqlite::case::SqliteCaseRepository;
use casework_infra::sqlite::document::SqliteDocumentRepository;
use casework_infra::sqlite::request::SqliteRequestRepository;
use casework_infra::sqlite::{DatabasePool, SqliteStatusLedger, default_database_url};
use casework_infra::wasm::{ModuleRuntime, WasmModuleLoader};
use casework_types::config::ServiceConfig;

/// Fully wired dispatch pipeline.
pub struct AppState {
    pub config: ServiceConfig,
    pub broker: Arc<QueueBroker>,
    pub publisher_pool: Arc<PublisherPool<QueueBroker>>,
    pub scanner: Arc<ModuleScanner>,
    pub registry: Arc<ModuleRegistry>,
    pub incoming: Arc<IncomingProcessor<SqliteStatusLedger>>,
    pub responses: Arc<ResponseProcessor<SqliteStatusLedger>>,
}

impl AppState {
    /// Load configuration from `data_dir` and build every component.
    pub async fn init(data_dir: &Path) -> anyhow::Result<Self> {
        let config = load_service_config(data_dir).await;

        let database_url = config
            .database_url
            .clone()
            .unwrap_or_else(default_database_url);
        let pool = DatabasePool::new(&database_url)
            .await
            .with_context(|| format!("opening database at {database_url}"))?;

        let ledger = Arc::new(SqliteStatusLedger::new(pool.clone()));
        let case_repo = Arc::new(SqliteCaseRepository::new(pool.clone()));
        let document_repo = Arc::new(SqliteDocumentRepository::new(pool.clone()));
        let request_repo = Arc::new(SqliteRequestRepository::new(pool.clone()));

        let scanner = Arc::new(ModuleScanner::new(&config.modules_root));
        scanner.scan();

        let runtime = Arc::new(ModuleRuntime::new().context("creating module runtime")?);
        let host_version = semver::Version::parse(env!("CARGO_PKG_VERSION"))
            .context("parsing host version")?;
        let loader = WasmModuleLoader::new(runtime, host_version);
        let registry = Arc::new(ModuleRegistry::new(scanner.clone(), loader));

        let mut actions = ActionTable::new();
        actions.register(CasesGroup::new(case_repo));
        actions.register(DocumentsGroup::new(document_repo));
        actions.register(RequestsGroup::new(request_repo));
        actions.register(ProcessingStatusesGroup::new(ledger.clone()));
        actions.register(VersionGroup::new(registry.clone()));

        let broker = Arc::new(QueueBroker::new(Duration::from_millis(
            config.publish_timeout_ms,
        )));
        let publisher_pool = Arc::new(PublisherPool::new(broker.clone()));

        let incoming = Arc::new(IncomingProcessor::new(
            actions,
            registry.clone(),
            ledger.clone(),
        ));
        let responses = Arc::new(ResponseProcessor::new(registry.clone(), ledger));

        Ok(Self {
            config,
            broker,
            publisher_pool,
            scanner,
            registry,
            incoming,
            responses,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use casework_core::ledger::ProcessingStatusLedger;
    use casework_core::transport::Transport;
    use casework_types::status::ProcessingOutcome;

    use super::*;

    async fn make_state(dir: &Path) -> AppState {
        let db_path = dir.join("casework.db");
        tokio::fs::write(
            dir.join("config.toml"),
            format!(
                "modules_root = \"{}\"\ndatabase_url = \"sqlite://{}?mode=rwc\"\n",
                dir.join("modules").display(),
                db_path.display()
            ),
        )
        .await
        .unwrap();
        AppState::init(dir).await.unwrap()
    }

    #[tokio::test]
    async fn init_wires_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;

        assert_eq!(state.config.incoming_listeners, 4);
        assert!(state.registry.loaded_modules().await.is_empty());
        assert!(state.publisher_pool.is_empty());
    }

    #[tokio::test]
    async fn dispatches_a_case_create_command_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path()).await;

        // Publish with unprefixed keys; the transport adds the x_ marker.
        let mut headers = HashMap::new();
        headers.insert("message_id".to_string(), "msg-e2e".to_string());
        headers.insert("entities".to_string(), "cases".to_string());
        headers.insert("action".to_string(), "create".to_string());

        state
            .broker
            .publish(
                &state.config.inbound_queue,
                br#"{"type":"test"}"#.to_vec(),
                &headers,
            )
            .await
            .unwrap();

        let subscription = state.broker.subscribe(&state.config.inbound_queue);
        let envelope = subscription.recv().await.unwrap();
        assert!(state.incoming.process(&envelope).await);

        // The ledger row is visible through a second pool over the same db.
        let url = state.config.database_url.clone().unwrap();
        let pool = DatabasePool::new(&url).await.unwrap();
        let ledger = SqliteStatusLedger::new(pool);
        let records = ledger.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ProcessingOutcome::Ok);
        assert_eq!(records[0].message_id.as_deref(), Some("msg-e2e"));
        assert_eq!(records[0].headers["x_entities"], "cases");
    }
}
