//! Service configuration surface.
//!
//! Deserialized from `config.toml` in the data directory. Every field has a
//! default so a missing or partial file still yields a runnable service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel in `response_queues` replaced by a generated unique queue name
/// at startup.
pub const RANDOM_QUEUE_SENTINEL: &str = "<random>";

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root directory scanned for versioned module directories.
    pub modules_root: PathBuf,
    /// Fallback re-scan interval for the module scanner.
    pub rescan_interval_ms: u64,
    /// Debounce window for filesystem change notifications.
    pub debounce_ms: u64,
    /// Queue carrying inbound commands.
    pub inbound_queue: String,
    /// Number of concurrent inbound-queue listeners.
    pub incoming_listeners: usize,
    /// Comma-separated response queue names; `<random>` entries are replaced
    /// by generated unique names at startup.
    pub response_queues: String,
    /// Number of concurrent listeners per response queue.
    pub response_listeners: usize,
    /// Timeout applied to every transport publish.
    pub publish_timeout_ms: u64,
    /// SQLite database URL; defaults to `{data_dir}/casework.db` when unset.
    pub database_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            modules_root: PathBuf::from("modules"),
            rescan_interval_ms: 5_000,
            debounce_ms: 500,
            inbound_queue: "casework.commands".to_string(),
            incoming_listeners: 4,
            response_queues: "casework.responses".to_string(),
            response_listeners: 1,
            publish_timeout_ms: 500,
            database_url: None,
        }
    }
}

impl ServiceConfig {
    /// Split `response_queues` and replace every [`RANDOM_QUEUE_SENTINEL`]
    /// entry with a generated unique name. Empty segments are dropped.
    pub fn resolve_response_queues(&self) -> Vec<String> {
        self.response_queues
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                if name == RANDOM_QUEUE_SENTINEL {
                    format!("casework.responses.{}", Uuid::now_v7().simple())
                } else {
                    name.to_string()
                }
            })
            .collect()
    }
}
