//! SQLite-backed implementations of the casework-core ports.

pub mod case;
pub mod document;
pub mod pool;
pub mod request;
pub mod status_ledger;

pub use pool::{DatabasePool, default_database_url};
pub use status_ledger::SqliteStatusLedger;

use casework_types::error::RepositoryError;
use chrono::{DateTime, Utc};

/// Timestamps are stored as RFC 3339 text columns.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}
