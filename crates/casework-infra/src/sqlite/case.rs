//! SQLite case repository implementation.

use casework_core::repository::CaseRepository;
use casework_types::entity::{CaseRecord, CaseState};
use casework_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed case storage.
pub struct SqliteCaseRepository {
    pool: DatabasePool,
}

impl SqliteCaseRepository {
    /// Create a repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl CaseRepository for SqliteCaseRepository {
    async fn insert(&self, case: &CaseRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO cases (id, kind, subject, state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(case.id.to_string())
        .bind(&case.kind)
        .bind(&case.subject)
        .bind(case.state.to_string())
        .bind(format_datetime(&case.created_at))
        .bind(format_datetime(&case.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<CaseRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM cases WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| CaseRow::from_row(&row))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .map(CaseRow::into_record)
            .transpose()
    }

    async fn update(&self, case: &CaseRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE cases SET kind = ?, subject = ?, state = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&case.kind)
        .bind(&case.subject)
        .bind(case.state.to_string())
        .bind(format_datetime(&case.updated_at))
        .bind(case.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

struct CaseRow {
    id: String,
    kind: String,
    subject: Option<String>,
    state: String,
    created_at: String,
    updated_at: String,
}

impl CaseRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            subject: row.try_get("subject")?,
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<CaseRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid case id: {e}")))?;
        let state: CaseState = self.state.parse().map_err(RepositoryError::Query)?;

        Ok(CaseRecord {
            id,
            kind: self.kind,
            subject: self.subject,
            state,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}
