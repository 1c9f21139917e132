//! SQLite processing-status ledger implementation.
//!
//! Appends one row per processed command or reply; rows are never updated.
//! Provides the recent-records query operational tooling reads and the
//! cutoff-based prune the `processing_statuses` action group drives.

use casework_core::ledger::ProcessingStatusLedger;
use casework_types::error::RepositoryError;
use casework_types::status::{ProcessingOutcome, ProcessingStatus};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed processing-status ledger.
pub struct SqliteStatusLedger {
    pool: DatabasePool,
}

impl SqliteStatusLedger {
    /// Create a ledger backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl ProcessingStatusLedger for SqliteStatusLedger {
    async fn append(&self, record: &ProcessingStatus) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO processing_status
               (id, message_id, outcome, headers, error_class, error_text, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.message_id)
        .bind(record.outcome.to_string())
        .bind(record.headers.to_string())
        .bind(&record.error_class)
        .bind(&record.error_text)
        .bind(format_datetime(&record.recorded_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ProcessingStatus>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM processing_status ORDER BY recorded_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let status_row =
                StatusRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            records.push(status_row.into_record()?);
        }
        Ok(records)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM processing_status WHERE recorded_at < ?")
            .bind(format_datetime(&cutoff))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Private Row types
// ---------------------------------------------------------------------------

struct StatusRow {
    id: String,
    message_id: Option<String>,
    outcome: String,
    headers: String,
    error_class: Option<String>,
    error_text: Option<String>,
    recorded_at: String,
}

impl StatusRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            message_id: row.try_get("message_id")?,
            outcome: row.try_get("outcome")?,
            headers: row.try_get("headers")?,
            error_class: row.try_get("error_class")?,
            error_text: row.try_get("error_text")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_record(self) -> Result<ProcessingStatus, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid status id: {e}")))?;
        let outcome: ProcessingOutcome =
            self.outcome.parse().map_err(RepositoryError::Query)?;
        let headers = serde_json::from_str(&self.headers)
            .map_err(|e| RepositoryError::Query(format!("invalid headers json: {e}")))?;
        let recorded_at = parse_datetime(&self.recorded_at)?;

        Ok(ProcessingStatus {
            id,
            message_id: self.message_id,
            outcome,
            headers,
            error_class: self.error_class,
            error_text: self.error_text,
            recorded_at,
        })
    }
}
