//! Queue transport trait and the in-process broker implementation.
//!
//! `Transport` is the thin seam over a queue client: publish with header
//! prefixing, subscribe with competing consumers, and a short publish
//! timeout so a stalled broker cannot park a caller indefinitely. The
//! in-process `QueueBroker` backs it with one bounded `mpsc` channel per
//! queue whose receiver is shared between subscribers -- each delivered
//! message reaches exactly one listener, per-listener order is FIFO, and no
//! ordering holds across listeners. A broker-backed implementation would
//! replace this type behind the same trait.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use casework_types::envelope::{Envelope, prefix_headers};

/// Buffer size for per-queue channels.
const QUEUE_BUFFER: usize = 1024;

/// Errors that can occur during transport operations.
///
/// These propagate to the immediate caller -- silently dropping an outbound
/// message would be a correctness bug for whatever depends on it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The publish did not complete within the configured timeout.
    #[error("publish to '{queue}' timed out after {timeout:?}")]
    Timeout { queue: String, timeout: Duration },

    /// The queue's channel is closed (broker shut down).
    #[error("queue '{0}' is closed")]
    Closed(String),

    /// The caller supplied a header map with non-ASCII keys.
    #[error("invalid header map: {0}")]
    InvalidHeaders(String),
}

/// Thin wrapper over a queue client.
pub trait Transport: Send + Sync {
    /// Send `payload` to `queue` with `headers`, each key prefixed with the
    /// routing marker unless already so prefixed.
    fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        headers: &HashMap<String, String>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Register a competing consumer on `queue`.
    fn subscribe(&self, queue: &str) -> Subscription;

    /// Approximate number of undelivered messages sitting in `queue`.
    fn queue_len(&self, queue: &str) -> usize;
}

/// A competing-consumer handle on one queue.
///
/// Subscriptions on the same queue share the underlying receiver; each
/// message is delivered to exactly one of them.
#[derive(Clone)]
pub struct Subscription {
    queue: String,
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
}

impl Subscription {
    /// The queue this subscription consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Receive the next message, parking until one arrives.
    ///
    /// Returns `None` when the queue is closed.
    pub async fn recv(&self) -> Option<Envelope> {
        self.rx.lock().await.recv().await
    }
}

struct QueueHandle {
    tx: mpsc::Sender<Envelope>,
    rx: Arc<Mutex<mpsc::Receiver<Envelope>>>,
}

/// In-process queue broker.
pub struct QueueBroker {
    queues: DashMap<String, QueueHandle>,
    publish_timeout: Duration,
}

impl QueueBroker {
    /// Create a broker whose publishes time out after `publish_timeout`.
    pub fn new(publish_timeout: Duration) -> Self {
        Self {
            queues: DashMap::new(),
            publish_timeout,
        }
    }

    /// Get or create the channel pair for `queue`.
    fn handle(&self, queue: &str) -> dashmap::mapref::one::Ref<'_, String, QueueHandle> {
        if let Some(handle) = self.queues.get(queue) {
            return handle;
        }
        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                debug!(%queue, "declaring queue");
                let (tx, rx) = mpsc::channel(QUEUE_BUFFER);
                QueueHandle {
                    tx,
                    rx: Arc::new(Mutex::new(rx)),
                }
            })
            .downgrade()
    }
}

impl Transport for QueueBroker {
    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        headers: &HashMap<String, String>,
    ) -> Result<(), TransportError> {
        // Header keys are ASCII on the wire; fail fast rather than let a
        // broker reject the message later.
        if let Some(bad) = headers.keys().find(|k| !k.is_ascii()) {
            return Err(TransportError::InvalidHeaders(format!(
                "non-ASCII header key: '{bad}'"
            )));
        }

        let envelope = Envelope::new(prefix_headers(headers), payload);
        let tx = self.handle(queue).tx.clone();

        match tokio::time::timeout(self.publish_timeout, tx.send(envelope)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(TransportError::Closed(queue.to_string())),
            Err(_) => Err(TransportError::Timeout {
                queue: queue.to_string(),
                timeout: self.publish_timeout,
            }),
        }
    }

    fn subscribe(&self, queue: &str) -> Subscription {
        let rx = self.handle(queue).rx.clone();
        Subscription {
            queue: queue.to_string(),
            rx,
        }
    }

    fn queue_len(&self, queue: &str) -> usize {
        let handle = self.handle(queue);
        handle.tx.max_capacity() - handle.tx.capacity()
    }
}

impl std::fmt::Debug for QueueBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueBroker")
            .field("queues", &self.queues.len())
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_broker() -> QueueBroker {
        QueueBroker::new(Duration::from_millis(500))
    }

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn publish_then_receive_round_trips() {
        let broker = make_broker();
        let sub = broker.subscribe("commands");

        broker
            .publish("commands", b"{}".to_vec(), &headers(&[("x_message_id", "1")]))
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.message_id(), Some("1"));
        assert_eq!(envelope.body, b"{}");
    }

    #[tokio::test]
    async fn publish_prefixes_header_keys() {
        let broker = make_broker();
        let sub = broker.subscribe("q");

        broker
            .publish("q", Vec::new(), &headers(&[("foo", "bar")]))
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.headers.get("x_foo").map(String::as_str), Some("bar"));
        assert!(!envelope.headers.contains_key("foo"));
    }

    #[tokio::test]
    async fn publish_does_not_double_prefix() {
        let broker = make_broker();
        let sub = broker.subscribe("q");

        broker
            .publish("q", Vec::new(), &headers(&[("x_foo", "bar")]))
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.headers.get("x_foo").map(String::as_str), Some("bar"));
        assert!(!envelope.headers.contains_key("x_x_foo"));
    }

    #[tokio::test]
    async fn each_message_reaches_exactly_one_subscriber() {
        let broker = Arc::new(make_broker());
        let sub_a = broker.subscribe("work");
        let sub_b = broker.subscribe("work");

        for i in 0..10 {
            broker
                .publish("work", Vec::new(), &headers(&[("x_message_id", &i.to_string())]))
                .await
                .unwrap();
        }

        // Drain from both subscriptions; together they must see each message
        // exactly once.
        let mut seen = Vec::new();
        for _ in 0..10 {
            let envelope = tokio::select! {
                Some(e) = sub_a.recv() => e,
                Some(e) = sub_b.recv() => e,
            };
            seen.push(envelope.message_id().unwrap().to_string());
        }
        seen.sort_by_key(|s| s.parse::<u32>().unwrap());
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn publish_rejects_non_ascii_header_keys() {
        let broker = make_broker();
        let result = broker
            .publish("q", Vec::new(), &headers(&[("fü", "bar")]))
            .await;
        assert!(matches!(result, Err(TransportError::InvalidHeaders(_))));
    }

    #[tokio::test]
    async fn publish_to_full_queue_times_out() {
        let broker = QueueBroker::new(Duration::from_millis(50));
        // No subscriber draining; fill the buffer to force a timeout.
        for _ in 0..1024 {
            broker
                .publish("stalled", Vec::new(), &HashMap::new())
                .await
                .unwrap();
        }

        let result = broker.publish("stalled", Vec::new(), &HashMap::new()).await;
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
    }

    #[tokio::test]
    async fn queue_len_counts_undelivered_messages() {
        let broker = make_broker();
        assert_eq!(broker.queue_len("q"), 0);

        broker.publish("q", Vec::new(), &HashMap::new()).await.unwrap();
        broker.publish("q", Vec::new(), &HashMap::new()).await.unwrap();
        assert_eq!(broker.queue_len("q"), 2);

        let sub = broker.subscribe("q");
        sub.recv().await.unwrap();
        assert_eq!(broker.queue_len("q"), 1);
    }
}
