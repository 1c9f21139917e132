//! The built-in action groups: cases, documents, requests,
//! processing_statuses, and version.
//!
//! Each group is a thin facade over a repository port -- argument extraction
//! from the JSON body, a repository call, and the resulting record echoed
//! back as JSON. Unknown operations are reported, never guessed.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use casework_types::entity::{CaseRecord, CaseState, DocumentRecord, RequestRecord, RequestState};
use casework_types::error::{DispatchError, RepositoryError};

use crate::dispatch::group::ActionGroup;
use crate::ledger::ProcessingStatusLedger;
use crate::module::ModuleRegistry;
use crate::repository::{CaseRepository, DocumentRepository, RequestRepository};

// ---------------------------------------------------------------------------
// Body helpers
// ---------------------------------------------------------------------------

fn object(body: &serde_json::Value) -> Result<&serde_json::Map<String, serde_json::Value>, DispatchError> {
    body.as_object()
        .ok_or_else(|| DispatchError::InvalidArgument("body must be a JSON object".to_string()))
}

fn require_str<'a>(
    map: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str, DispatchError> {
    map.get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DispatchError::InvalidArgument(format!("field '{key}' (string) is required")))
}

fn optional_str<'a>(
    map: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<&'a str> {
    map.get(key).and_then(serde_json::Value::as_str)
}

fn require_uuid(
    map: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Uuid, DispatchError> {
    let raw = require_str(map, key)?;
    Uuid::parse_str(raw)
        .map_err(|e| DispatchError::InvalidArgument(format!("field '{key}' is not a uuid: {e}")))
}

fn require_u64(
    map: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<u64, DispatchError> {
    map.get(key)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| DispatchError::InvalidArgument(format!("field '{key}' (integer) is required")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, DispatchError> {
    serde_json::to_value(value).map_err(|e| DispatchError::Internal(e.to_string()))
}

fn unknown(group: &'static str, operation: &str) -> DispatchError {
    DispatchError::UnknownOperation {
        group: group.to_string(),
        operation: operation.to_string(),
    }
}

// ---------------------------------------------------------------------------
// cases
// ---------------------------------------------------------------------------

/// `cases`: create, update, close.
pub struct CasesGroup<R> {
    repo: Arc<R>,
}

impl<R> CasesGroup<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

impl<R: CaseRepository> ActionGroup for CasesGroup<R> {
    fn name(&self) -> &'static str {
        "cases"
    }

    async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        let map = object(body)?;
        match operation {
            "create" => {
                let kind = require_str(map, "type")?;
                let subject = optional_str(map, "subject").map(str::to_string);
                let case = CaseRecord::new(kind, subject);
                self.repo.insert(&case).await?;
                to_json(&case)
            }
            "update" => {
                let id = require_uuid(map, "id")?;
                let mut case = self.repo.get(&id).await?.ok_or(RepositoryError::NotFound)?;
                if let Some(subject) = optional_str(map, "subject") {
                    case.subject = Some(subject.to_string());
                }
                if let Some(state) = optional_str(map, "state") {
                    case.state = CaseState::from_str(state)
                        .map_err(DispatchError::InvalidArgument)?;
                }
                case.updated_at = Utc::now();
                self.repo.update(&case).await?;
                to_json(&case)
            }
            "close" => {
                let id = require_uuid(map, "id")?;
                let mut case = self.repo.get(&id).await?.ok_or(RepositoryError::NotFound)?;
                case.state = CaseState::Closed;
                case.updated_at = Utc::now();
                self.repo.update(&case).await?;
                to_json(&case)
            }
            other => Err(unknown("cases", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// documents
// ---------------------------------------------------------------------------

/// `documents`: create, attach.
pub struct DocumentsGroup<R> {
    repo: Arc<R>,
}

impl<R> DocumentsGroup<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

impl<R: DocumentRepository> ActionGroup for DocumentsGroup<R> {
    fn name(&self) -> &'static str {
        "documents"
    }

    async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        let map = object(body)?;
        match operation {
            "create" => {
                let title = require_str(map, "title")?;
                let content_ref = optional_str(map, "content_ref").map(str::to_string);
                let document = DocumentRecord::new(title, content_ref);
                self.repo.insert(&document).await?;
                to_json(&document)
            }
            "attach" => {
                let id = require_uuid(map, "id")?;
                let case_id = require_uuid(map, "case_id")?;
                self.repo.attach(&id, &case_id).await?;
                Ok(serde_json::json!({ "id": id, "case_id": case_id, "attached": true }))
            }
            other => Err(unknown("documents", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// requests
// ---------------------------------------------------------------------------

/// `requests`: create, update.
pub struct RequestsGroup<R> {
    repo: Arc<R>,
}

impl<R> RequestsGroup<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

impl<R: RequestRepository> ActionGroup for RequestsGroup<R> {
    fn name(&self) -> &'static str {
        "requests"
    }

    async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        let map = object(body)?;
        match operation {
            "create" => {
                let kind = require_str(map, "type")?;
                let case_id = match optional_str(map, "case_id") {
                    Some(raw) => Some(Uuid::parse_str(raw).map_err(|e| {
                        DispatchError::InvalidArgument(format!("field 'case_id' is not a uuid: {e}"))
                    })?),
                    None => None,
                };
                let request = RequestRecord::new(kind, case_id);
                self.repo.insert(&request).await?;
                to_json(&request)
            }
            "update" => {
                let id = require_uuid(map, "id")?;
                let state = require_str(map, "state")?;
                let mut request = self.repo.get(&id).await?.ok_or(RepositoryError::NotFound)?;
                request.state =
                    RequestState::from_str(state).map_err(DispatchError::InvalidArgument)?;
                request.updated_at = Utc::now();
                self.repo.update(&request).await?;
                to_json(&request)
            }
            other => Err(unknown("requests", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// processing_statuses
// ---------------------------------------------------------------------------

/// `processing_statuses`: prune.
///
/// The ledger itself never purges; this is the operational command that
/// does, driven like any other inbound command.
pub struct ProcessingStatusesGroup<L> {
    ledger: Arc<L>,
}

impl<L> ProcessingStatusesGroup<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }
}

impl<L: ProcessingStatusLedger> ActionGroup for ProcessingStatusesGroup<L> {
    fn name(&self) -> &'static str {
        "processing_statuses"
    }

    async fn invoke(
        &self,
        operation: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        match operation {
            "prune" => {
                let map = object(body)?;
                let days = require_u64(map, "older_than_days")?;
                let cutoff = Utc::now() - chrono::Duration::days(days as i64);
                let pruned = self.ledger.prune_older_than(cutoff).await?;
                Ok(serde_json::json!({ "pruned": pruned }))
            }
            other => Err(unknown("processing_statuses", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// `version`: show.
pub struct VersionGroup {
    registry: Arc<ModuleRegistry>,
}

impl VersionGroup {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }
}

impl ActionGroup for VersionGroup {
    fn name(&self) -> &'static str {
        "version"
    }

    async fn invoke(
        &self,
        operation: &str,
        _body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        match operation {
            "show" => {
                let modules: Vec<serde_json::Value> = self
                    .registry
                    .loaded_versions()
                    .await
                    .into_iter()
                    .map(|(name, version)| serde_json::json!({ "name": name, "version": version }))
                    .collect();
                Ok(serde_json::json!({
                    "service": "casework",
                    "version": env!("CARGO_PKG_VERSION"),
                    "modules": modules,
                }))
            }
            other => Err(unknown("version", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
