//! Processing-status ledger port.
//!
//! The ledger is the append-only audit sink of the dispatch pipeline and the
//! primary debugging surface for fire-and-forget commands: there is no
//! synchronous caller waiting for a reply, so a ledger row is the only
//! externally observable record of what happened to a message.
//!
//! Uses native async fn in traits; the infrastructure layer implements it
//! with SQLite, and [`MemoryStatusLedger`] backs tests and local runs.

use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use casework_types::error::RepositoryError;
use casework_types::status::ProcessingStatus;

/// Append-only store for [`ProcessingStatus`] records.
pub trait ProcessingStatusLedger: Send + Sync {
    /// Append one record. Records are never updated afterwards.
    fn append(
        &self,
        record: &ProcessingStatus,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// The most recent records, newest first.
    fn recent(
        &self,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<ProcessingStatus>, RepositoryError>> + Send;

    /// Delete records older than `cutoff`, returning how many were removed.
    ///
    /// The dispatch pipeline never calls this on its own; it backs the
    /// operational prune command.
    fn prune_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// In-memory ledger for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStatusLedger {
    records: Mutex<Vec<ProcessingStatus>>,
}

impl MemoryStatusLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far, oldest first.
    pub fn all(&self) -> Vec<ProcessingStatus> {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl ProcessingStatusLedger for MemoryStatusLedger {
    async fn append(&self, record: &ProcessingStatus) -> Result<(), RepositoryError> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ProcessingStatus>, RepositoryError> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let before = records.len();
        records.retain(|r| r.recorded_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
