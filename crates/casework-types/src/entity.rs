//! Case-file entities served by the built-in action groups.
//!
//! These records stay deliberately thin: the dispatch pipeline only needs
//! enough shape to create and update them through the repository ports.
//! Richer modeling of the case domain lives outside this service.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    Open,
    Closed,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for CaseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("invalid case state: '{other}'")),
        }
    }
}

/// A case record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: Uuid,
    /// Business kind of the case (the `type` field of the create command).
    pub kind: String,
    pub subject: Option<String>,
    pub state: CaseState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseRecord {
    /// Build a fresh open case.
    pub fn new(kind: impl Into<String>, subject: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            kind: kind.into(),
            subject,
            state: CaseState::Open,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A document record, optionally attached to a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub case_id: Option<Uuid>,
    pub title: String,
    /// Pointer into the external file store; the blob itself never passes
    /// through this service.
    pub content_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Build a fresh unattached document.
    pub fn new(title: impl Into<String>, content_ref: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            case_id: None,
            title: title.into(),
            content_ref,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Completed,
    Rejected,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for RequestState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("invalid request state: '{other}'")),
        }
    }
}

/// A request record, optionally tied to a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub case_id: Option<Uuid>,
    pub kind: String,
    pub state: RequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequestRecord {
    /// Build a fresh pending request.
    pub fn new(kind: impl Into<String>, case_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            case_id,
            kind: kind.into(),
            state: RequestState::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
