//! Publishing into the fan-out layer: subscribers-if-present, backlog
//! otherwise.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ws::backlog::BacklogManager;
use crate::ws::subscription::{subscription_key, SharedRegistry};

/// A single message travelling over a WebSocket, keyed by the same
/// `{channel}:{requestId}` pair used for subscriptions.
///
/// `payload`'s fields (including its own `type` discriminator — `sub_ack`,
/// `progress`, `ready`, `error`, `assistant`, ...) are flattened alongside
/// `channel`/`requestId` on the wire, matching flat per-message
/// shapes rather than nesting everything under a `payload` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub channel: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// Publishes envelopes to live subscribers, or into the backlog when none
/// are attached yet (subscribe-before-job-exists and
/// disconnect-before-delivery races).
pub struct PublishManager {
    registry: SharedRegistry,
    backlog: Arc<BacklogManager>,
}

impl PublishManager {
    pub fn new(registry: SharedRegistry, backlog: Arc<BacklogManager>) -> Self {
        Self { registry, backlog }
    }

    /// Publish `envelope`. If live subscribers exist for its key, deliver to
    /// all of them directly (best-effort — a full/closed channel is logged
    /// and skipped, never held up). If none exist, the envelope is appended
    /// to the backlog for that key.
    pub fn publish(&self, envelope: WsEnvelope) {
        let key = subscription_key(&envelope.channel, &envelope.request_id);
        let subscribers = self.registry.snapshot(&key);

        if subscribers.is_empty() {
            self.backlog.push(key, envelope);
            return;
        }

        for subscriber in subscribers {
            if subscriber.sender.send(envelope.clone()).is_err() {
                warn!(socket_id = %subscriber.socket_id, key = %key, "dropping envelope for closed socket");
            }
        }
    }

    /// Drain and deliver any backlogged envelopes for `key` to a freshly
    /// attached subscriber. Called immediately after subscribe.
    pub fn drain_backlog_to(&self, key: &str, subscriber: &crate::ws::subscription::WsSubscriber) {
        for envelope in self.backlog.drain(key) {
            let _ = subscriber.sender.send(envelope);
        }
    }
}
