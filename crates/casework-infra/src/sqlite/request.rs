//! SQLite request repository implementation.

use casework_core::repository::RequestRepository;
use casework_types::entity::{RequestRecord, RequestState};
use casework_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed request storage.
pub struct SqliteRequestRepository {
    pool: DatabasePool,
}

impl SqliteRequestRepository {
    /// Create a repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl RequestRepository for SqliteRequestRepository {
    async fn insert(&self, request: &RequestRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO requests (id, case_id, kind, state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(request.case_id.map(|id| id.to_string()))
        .bind(&request.kind)
        .bind(request.state.to_string())
        .bind(format_datetime(&request.created_at))
        .bind(format_datetime(&request.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<RequestRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| RequestRow::from_row(&row))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .map(RequestRow::into_record)
            .transpose()
    }

    async fn update(&self, request: &RequestRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE requests SET case_id = ?, kind = ?, state = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(request.case_id.map(|id| id.to_string()))
        .bind(&request.kind)
        .bind(request.state.to_string())
        .bind(format_datetime(&request.updated_at))
        .bind(request.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

struct RequestRow {
    id: String,
    case_id: Option<String>,
    kind: String,
    state: String,
    created_at: String,
    updated_at: String,
}

impl RequestRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("case_id")?,
            kind: row.try_get("kind")?,
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<RequestRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid request id: {e}")))?;
        let case_id = self
            .case_id
            .map(|raw| {
                Uuid::parse_str(&raw)
                    .map_err(|e| RepositoryError::Query(format!("invalid case_id: {e}")))
            })
            .transpose()?;
        let state: RequestState = self.state.parse().map_err(RepositoryError::Query)?;

        Ok(RequestRecord {
            id,
            case_id,
            kind: self.kind,
            state,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repo() -> (tempfile::TempDir, SqliteRequestRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteRequestRepository::new(pool))
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let (_dir, repo) = test_repo().await;
        let case_id = Uuid::now_v7();
        let request = RequestRecord::new("review", Some(case_id));

        repo.insert(&request).await.unwrap();
        let fetched = repo.get(&request.id).await.unwrap().unwrap();

        assert_eq!(fetched.kind, "review");
        assert_eq!(fetched.case_id, Some(case_id));
        assert_eq!(fetched.state, RequestState::Pending);
    }

    #[tokio::test]
    async fn update_transitions_state() {
        let (_dir, repo) = test_repo().await;
        let mut request = RequestRecord::new("review", None);
        repo.insert(&request).await.unwrap();

        request.state = RequestState::Completed;
        repo.update(&request).await.unwrap();

        let fetched = repo.get(&request.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, RequestState::Completed);
    }

    #[tokio::test]
    async fn update_missing_request_is_not_found() {
        let (_dir, repo) = test_repo().await;
        let request = RequestRecord::new("review", None);
        assert!(matches!(
            repo.update(&request).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
