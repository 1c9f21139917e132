//! The reply broadcast processor.
//!
//! Replies to previously issued requests arrive on response queues with no
//! addressing: the processor offers each envelope to every loaded module
//! that exposes a reply handler, in the registry's enumeration order, and
//! stops at the first acceptance. Handler failures are captured, never
//! propagated -- a broken module must not take the listener down.

use std::sync::Arc;

use tracing::{debug, error, warn};

use casework_types::envelope::Envelope;
use casework_types::error::InvokeError;
use casework_types::status::ProcessingStatus;

use crate::ledger::ProcessingStatusLedger;
use crate::module::ModuleRegistry;

/// Broadcasts reply envelopes to loaded modules.
pub struct ResponseProcessor<L> {
    registry: Arc<ModuleRegistry>,
    ledger: Arc<L>,
}

impl<L: ProcessingStatusLedger> ResponseProcessor<L> {
    /// Build a processor over the given registry and ledger.
    pub fn new(registry: Arc<ModuleRegistry>, ledger: Arc<L>) -> Self {
        Self { registry, ledger }
    }

    /// Process one reply envelope.
    ///
    /// Returns `true` iff some module accepted it. One ledger record is
    /// appended per reply; it is an `error` record only when a handler
    /// failed and nothing accepted the reply.
    pub async fn process(&self, envelope: &Envelope) -> bool {
        let modules = self.registry.loaded_modules().await;
        let mut accepted = false;
        let mut first_failure: Option<InvokeError> = None;

        for module in &modules {
            if !module.handles_replies() {
                debug!(module = module.name(), "module does not expose a reply handler");
                continue;
            }
            match module.handle_reply(envelope).await {
                Ok(true) => {
                    debug!(module = module.name(), "module accepted reply");
                    accepted = true;
                    break;
                }
                Ok(false) => {
                    debug!(module = module.name(), "module declined reply");
                }
                Err(err) => {
                    error!(module = module.name(), error = %err, "reply handler failed");
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        if !accepted {
            if modules.is_empty() {
                warn!("reply received but no modules are loaded");
            } else {
                warn!(
                    modules = modules.len(),
                    "no loaded module accepted the reply"
                );
            }
        }

        let message_id = envelope.message_id().map(str::to_string);
        let record = match (accepted, first_failure) {
            (false, Some(err)) => ProcessingStatus::error(
                message_id,
                &envelope.headers,
                "ReplyHandlerError",
                err.to_string(),
            ),
            _ => ProcessingStatus::ok(message_id, &envelope.headers),
        };
        if let Err(err) = self.ledger.append(&record).await {
            error!(error = %err, "failed to append reply status record");
        }

        accepted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
