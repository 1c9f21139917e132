//! Message envelope carried over queue transports.
//!
//! An envelope is an opaque body blob plus a case-sensitive string header
//! map. The same wire shape carries inbound commands and asynchronous
//! replies; only the routing headers differ. The body is interpreted as
//! JSON solely at the point where dispatch requires it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Routing header naming the message's opaque identifier.
pub const MESSAGE_ID_HEADER: &str = "x_message_id";

/// Routing header naming the dispatch namespace (action group or module).
pub const ENTITIES_HEADER: &str = "x_entities";

/// Routing header naming the operation within the namespace.
pub const ACTION_HEADER: &str = "x_action";

/// Prefix added to outbound header keys that do not already carry it.
pub const HEADER_PREFIX: &str = "x_";

/// A queue message: header map plus opaque body.
///
/// Header keys are case-sensitive ASCII and are stored exactly as received;
/// no normalization is applied beyond the `x_` prefixing done on publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Case-sensitive string headers.
    pub headers: HashMap<String, String>,
    /// Opaque body blob. JSON for all built-in action groups.
    pub body: Vec<u8>,
}

impl Envelope {
    /// Build an envelope from a header map and body blob.
    pub fn new(headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// The `x_message_id` routing header, if present.
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get(MESSAGE_ID_HEADER).map(String::as_str)
    }

    /// The `x_entities` routing header, if present.
    pub fn entities(&self) -> Option<&str> {
        self.headers.get(ENTITIES_HEADER).map(String::as_str)
    }

    /// The `x_action` routing header, if present.
    pub fn action(&self) -> Option<&str> {
        self.headers.get(ACTION_HEADER).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn body_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The header map as a JSON object, for ledger records and module calls.
    pub fn headers_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.headers
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }
}

/// Prefix a header key with [`HEADER_PREFIX`] unless it already carries it.
pub fn prefixed_key(key: &str) -> String {
    if key.starts_with(HEADER_PREFIX) {
        key.to_string()
    } else {
        format!("{HEADER_PREFIX}{key}")
    }
}

/// Apply [`prefixed_key`] to every key of a header map.
pub fn prefix_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (prefixed_key(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_envelope(pairs: &[(&str, &str)], body: &str) -> Envelope {
        let headers = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Envelope::new(headers, body.as_bytes().to_vec())
    }

    #[test]
    fn routing_headers_are_read_verbatim() {
        let env = make_envelope(
            &[
                (MESSAGE_ID_HEADER, "msg-1"),
                (ENTITIES_HEADER, "cases"),
                (ACTION_HEADER, "create"),
            ],
            "{}",
        );
        assert_eq!(env.message_id(), Some("msg-1"));
        assert_eq!(env.entities(), Some("cases"));
        assert_eq!(env.action(), Some("create"));
    }

    #[test]
    fn missing_headers_are_none() {
        let env = make_envelope(&[], "{}");
        assert!(env.message_id().is_none());
        assert!(env.entities().is_none());
        assert!(env.action().is_none());
    }

    #[test]
    fn header_keys_are_case_sensitive() {
        let env = make_envelope(&[("X_MESSAGE_ID", "msg-1")], "{}");
        assert!(env.message_id().is_none());
    }

    #[test]
    fn body_json_parses_object() {
        let env = make_envelope(&[], r#"{"type":"test"}"#);
        let value = env.body_json().unwrap();
        assert_eq!(value["type"], "test");
    }

    #[test]
    fn body_json_rejects_malformed() {
        let env = make_envelope(&[], "{not json");
        assert!(env.body_json().is_err());
    }

    #[test]
    fn prefixed_key_adds_marker_once() {
        assert_eq!(prefixed_key("foo"), "x_foo");
        assert_eq!(prefixed_key("x_foo"), "x_foo");
    }

    #[test]
    fn prefix_headers_maps_all_keys() {
        let mut headers = HashMap::new();
        headers.insert("foo".to_string(), "bar".to_string());
        headers.insert("x_baz".to_string(), "qux".to_string());

        let prefixed = prefix_headers(&headers);
        assert_eq!(prefixed.get("x_foo").map(String::as_str), Some("bar"));
        assert_eq!(prefixed.get("x_baz").map(String::as_str), Some("qux"));
        assert_eq!(prefixed.len(), 2);
    }

    #[test]
    fn headers_json_round_trips_map() {
        let env = make_envelope(&[("x_foo", "bar")], "{}");
        let json = env.headers_json();
        assert_eq!(json["x_foo"], "bar");
    }
}
