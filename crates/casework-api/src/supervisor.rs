//! The run loop: eager module loading, scanner-driven reloads, queue
//! listeners, and graceful shutdown.
//!
//! Listener concurrency equals the configured listener counts: each listener
//! task blocks on receive and handles one message at a time, so cancellation
//! is only observed between messages -- the in-flight message always
//! finishes before the task exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use casework_core::dispatch::{IncomingProcessor, ResponseProcessor};
use casework_core::module::scanner::start_scanner_watch;
use casework_core::module::{ModuleRegistry, ScanChangeKind};
use casework_core::transport::{PublisherPool, QueueBroker, Transport, WorkerId};
use casework_infra::sqlite::SqliteStatusLedger;

use crate::state::AppState;

/// Run the dispatcher until a termination signal arrives.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // Eagerly load everything discovered at startup.
    state.registry.reload_all().await;
    let loaded = state.registry.loaded_versions().await;
    info!(modules = loaded.len(), "initial module load complete");

    // Scanner watch: filesystem changes proactively reload or unload.
    let (watch_guard, change_rx) = start_scanner_watch(
        state.scanner.clone(),
        Duration::from_millis(state.config.debounce_ms),
        Duration::from_millis(state.config.rescan_interval_ms),
        cancel.clone(),
    );
    let change_task = spawn_change_applier(state.registry.clone(), change_rx, cancel.clone());

    let mut listeners: Vec<JoinHandle<()>> = Vec::new();

    for index in 0..state.config.incoming_listeners {
        listeners.push(spawn_incoming_listener(
            index,
            state.config.inbound_queue.clone(),
            state.broker.clone(),
            state.publisher_pool.clone(),
            state.incoming.clone(),
            cancel.clone(),
        ));
    }

    let response_queues = state.config.resolve_response_queues();
    info!(queues = ?response_queues, "response queues resolved");
    for queue in &response_queues {
        for index in 0..state.config.response_listeners {
            listeners.push(spawn_response_listener(
                index,
                queue.clone(),
                state.broker.clone(),
                state.responses.clone(),
                cancel.clone(),
            ));
        }
    }

    info!(
        inbound_queue = %state.config.inbound_queue,
        incoming_listeners = state.config.incoming_listeners,
        "casework dispatcher running"
    );

    // Park until a termination signal. Listeners stop accepting new work,
    // finish their in-flight message, and exit.
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining listeners");
    cancel.cancel();

    for listener in listeners {
        let _ = listener.await;
    }
    let _ = change_task.await;
    drop(watch_guard);

    info!(publishers = state.publisher_pool.len(), "dispatcher stopped");
    Ok(())
}

/// Apply scanner change batches to the registry.
fn spawn_change_applier(
    registry: Arc<ModuleRegistry>,
    mut change_rx: tokio::sync::mpsc::Receiver<Vec<casework_core::module::ScanChange>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => break,
                maybe = change_rx.recv() => match maybe {
                    Some(batch) => batch,
                    None => break,
                },
            };
            for change in batch {
                match change.kind {
                    ScanChangeKind::Removed => registry.unload(&change.name).await,
                    ScanChangeKind::Appeared | ScanChangeKind::Changed => {
                        registry.resolve(&change.name).await;
                    }
                }
            }
        }
    })
}

fn spawn_incoming_listener(
    index: usize,
    queue: String,
    broker: Arc<QueueBroker>,
    publisher_pool: Arc<PublisherPool<QueueBroker>>,
    processor: Arc<IncomingProcessor<SqliteStatusLedger>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let subscription = broker.subscribe(&queue);
    tokio::spawn(async move {
        // Each listener is one logical caller: its outbound publisher is
        // created lazily here and reclaimed when the listener completes.
        let worker = WorkerId::new();
        let _publisher = publisher_pool.get_or_create(worker);
        debug!(listener = index, %worker, %queue, "incoming listener started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                maybe = subscription.recv() => match maybe {
                    Some(envelope) => {
                        processor.process(&envelope).await;
                    }
                    None => break,
                },
            }
        }

        publisher_pool.release(&worker);
        debug!(listener = index, %queue, "incoming listener stopped");
    })
}

fn spawn_response_listener(
    index: usize,
    queue: String,
    broker: Arc<QueueBroker>,
    processor: Arc<ResponseProcessor<SqliteStatusLedger>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let subscription = broker.subscribe(&queue);
    tokio::spawn(async move {
        debug!(listener = index, %queue, "response listener started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                maybe = subscription.recv() => match maybe {
                    Some(envelope) => {
                        processor.process(&envelope).await;
                    }
                    None => break,
                },
            }
        }

        debug!(listener = index, %queue, "response listener stopped");
    })
}
