//! SQLite document repository implementation.

use casework_core::repository::DocumentRepository;
use casework_types::entity::DocumentRecord;
use casework_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed document storage.
pub struct SqliteDocumentRepository {
    pool: DatabasePool,
}

impl SqliteDocumentRepository {
    /// Create a repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl DocumentRepository for SqliteDocumentRepository {
    async fn insert(&self, document: &DocumentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO documents (id, case_id, title, content_ref, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(document.id.to_string())
        .bind(document.case_id.map(|id| id.to_string()))
        .bind(&document.title)
        .bind(&document.content_ref)
        .bind(format_datetime(&document.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<DocumentRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| DocumentRow::from_row(&row))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .map(DocumentRow::into_record)
            .transpose()
    }

    async fn attach(&self, id: &Uuid, case_id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE documents SET case_id = ? WHERE id = ?")
            .bind(case_id.to_string())
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

struct DocumentRow {
    id: String,
    case_id: Option<String>,
    title: String,
    content_ref: Option<String>,
    created_at: String,
}

impl DocumentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("case_id")?,
            title: row.try_get("title")?,
            content_ref: row.try_get("content_ref")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_record(self) -> Result<DocumentRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid document id: {e}")))?;
        let case_id = self
            .case_id
            .map(|raw| {
                Uuid::parse_str(&raw)
                    .map_err(|e| RepositoryError::Query(format!("invalid case_id: {e}")))
            })
            .transpose()?;

        Ok(DocumentRecord {
            id,
            case_id,
            title: self.title,
            content_ref: self.content_ref,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}
