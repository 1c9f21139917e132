//! Repository trait definitions for the case-file entities.
//!
//! These are the ports the built-in action groups persist through. The
//! infrastructure layer (casework-infra) implements them with SQLite; the
//! modeling here is deliberately thin -- the dispatch service creates and
//! updates records, nothing more.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use std::future::Future;

use uuid::Uuid;

use casework_types::entity::{CaseRecord, DocumentRecord, RequestRecord};
use casework_types::error::RepositoryError;

/// Storage for [`CaseRecord`]s.
pub trait CaseRepository: Send + Sync {
    /// Insert a new case.
    fn insert(
        &self,
        case: &CaseRecord,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a case by id.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl Future<Output = Result<Option<CaseRecord>, RepositoryError>> + Send;

    /// Replace an existing case. Errors with `NotFound` when absent.
    fn update(
        &self,
        case: &CaseRecord,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Storage for [`DocumentRecord`]s.
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document.
    fn insert(
        &self,
        document: &DocumentRecord,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a document by id.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl Future<Output = Result<Option<DocumentRecord>, RepositoryError>> + Send;

    /// Attach an existing document to a case. Errors with `NotFound` when
    /// the document does not exist.
    fn attach(
        &self,
        id: &Uuid,
        case_id: &Uuid,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Storage for [`RequestRecord`]s.
pub trait RequestRepository: Send + Sync {
    /// Insert a new request.
    fn insert(
        &self,
        request: &RequestRecord,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch a request by id.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl Future<Output = Result<Option<RequestRecord>, RepositoryError>> + Send;

    /// Replace an existing request. Errors with `NotFound` when absent.
    fn update(
        &self,
        request: &RequestRecord,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}
