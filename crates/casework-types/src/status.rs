//! Processing-status records: the append-only audit trail of the dispatch
//! pipeline.
//!
//! Exactly one record is created per processed command or reply, never
//! updated, never deleted by the dispatch subsystem (pruning is an
//! operational command). The constructors enforce the shape invariant:
//! an `error` record carries both `error_class` and `error_text`, an `ok`
//! record carries neither.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of processing a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Ok,
    Error,
}

impl fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ProcessingOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            other => Err(format!("invalid processing outcome: '{other}'")),
        }
    }
}

/// One row of the processing-status ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub id: Uuid,
    /// The `x_message_id` header value, when one was present.
    pub message_id: Option<String>,
    pub outcome: ProcessingOutcome,
    /// The original header map, stored as a JSON object.
    pub headers: serde_json::Value,
    pub error_class: Option<String>,
    pub error_text: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ProcessingStatus {
    /// Build an `ok` record. No error fields are set.
    pub fn ok(message_id: Option<String>, headers: &HashMap<String, String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_id,
            outcome: ProcessingOutcome::Ok,
            headers: headers_to_json(headers),
            error_class: None,
            error_text: None,
            recorded_at: Utc::now(),
        }
    }

    /// Build an `error` record. Both error fields are required.
    pub fn error(
        message_id: Option<String>,
        headers: &HashMap<String, String>,
        error_class: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_id,
            outcome: ProcessingOutcome::Error,
            headers: headers_to_json(headers),
            error_class: Some(error_class.into()),
            error_text: Some(error_text.into()),
            recorded_at: Utc::now(),
        }
    }
}

fn headers_to_json(headers: &HashMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> HashMap<String, String> {
        let mut h = HashMap::new();
        h.insert("x_message_id".to_string(), "msg-1".to_string());
        h
    }

    #[test]
    fn ok_record_has_no_error_fields() {
        let record = ProcessingStatus::ok(Some("msg-1".to_string()), &headers());
        assert_eq!(record.outcome, ProcessingOutcome::Ok);
        assert!(record.error_class.is_none());
        assert!(record.error_text.is_none());
        assert_eq!(record.headers["x_message_id"], "msg-1");
    }

    #[test]
    fn error_record_carries_class_and_text() {
        let record = ProcessingStatus::error(
            Some("msg-1".to_string()),
            &headers(),
            "MissingHeader",
            "header 'x_action' is missing",
        );
        assert_eq!(record.outcome, ProcessingOutcome::Error);
        assert_eq!(record.error_class.as_deref(), Some("MissingHeader"));
        assert_eq!(
            record.error_text.as_deref(),
            Some("header 'x_action' is missing")
        );
    }

    #[test]
    fn outcome_round_trips_through_strings() {
        assert_eq!(ProcessingOutcome::Ok.to_string(), "ok");
        assert_eq!(ProcessingOutcome::Error.to_string(), "error");
        assert_eq!("ok".parse::<ProcessingOutcome>().unwrap(), ProcessingOutcome::Ok);
        assert!("bogus".parse::<ProcessingOutcome>().is_err());
    }
}
