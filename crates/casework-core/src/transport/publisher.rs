//! Per-worker publisher pool.
//!
//! Publishers are per-caller so concurrent workers never share one
//! connection's in-flight state. Workers are short-lived, so the pool must
//! not grow unboundedly: entries are created lazily on first use and
//! reclaimed by an explicit `release` when the worker completes -- no
//! reliance on collector finalizers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::broker::{Transport, TransportError};

/// Identity of a logical caller (one listener task, one worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Mint a fresh worker identity.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One worker's outbound connection wrapper.
///
/// For the in-process broker this is a thin handle; a broker-backed
/// transport would own a real connection here.
pub struct Publisher<T: Transport> {
    transport: Arc<T>,
    worker: WorkerId,
}

impl<T: Transport> Publisher<T> {
    /// Publish `payload` to `queue` with `headers`.
    ///
    /// Failures propagate to the caller; the pool never swallows them.
    pub async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        headers: &HashMap<String, String>,
    ) -> Result<(), TransportError> {
        self.transport.publish(queue, payload, headers).await
    }

    /// The worker this publisher belongs to.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }
}

/// Pool mapping worker identity to its publisher.
pub struct PublisherPool<T: Transport> {
    transport: Arc<T>,
    publishers: DashMap<WorkerId, Arc<Publisher<T>>>,
}

impl<T: Transport> PublisherPool<T> {
    /// Create a pool handing out publishers over `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            publishers: DashMap::new(),
        }
    }

    /// The worker's publisher, created on first use.
    pub fn get_or_create(&self, worker: WorkerId) -> Arc<Publisher<T>> {
        self.publishers
            .entry(worker)
            .or_insert_with(|| {
                debug!(%worker, "creating publisher for worker");
                Arc::new(Publisher {
                    transport: self.transport.clone(),
                    worker,
                })
            })
            .clone()
    }

    /// Reclaim the worker's entry. Returns `true` if one existed.
    ///
    /// Callers must release on worker completion; the pool has no other
    /// eviction path.
    pub fn release(&self, worker: &WorkerId) -> bool {
        let removed = self.publishers.remove(worker).is_some();
        if removed {
            debug!(worker = %worker, "released publisher for worker");
        }
        removed
    }

    /// Number of live pool entries.
    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl<T: Transport> std::fmt::Debug for PublisherPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherPool")
            .field("entries", &self.publishers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
