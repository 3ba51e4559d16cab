//! Top-level WebSocket orchestrator: wires subscription, backlog, pending,
//! and publish state behind one shared handle.

use std::sync::Arc;

use crate::auth::SessionIdentity;
use crate::jobs::store::JobStore;
use crate::ws::backlog::BacklogManager;
use crate::ws::pending::PendingSubscriptions;
use crate::ws::publish::{PublishManager, WsEnvelope};
use crate::ws::subscription::{subscription_key, SubscriptionRegistry, WsSubscriber};

pub struct WebSocketManager {
    jobs: Arc<JobStore>,
    registry: Arc<SubscriptionRegistry>,
    backlog: Arc<BacklogManager>,
    pending: Arc<PendingSubscriptions>,
    publisher: PublishManager,
}

impl WebSocketManager {
    pub fn new(jobs: Arc<JobStore>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let backlog = Arc::new(BacklogManager::new());
        let pending = Arc::new(PendingSubscriptions::new());
        let publisher = PublishManager::new(Arc::clone(&registry), Arc::clone(&backlog));
        Self { jobs, registry, backlog, pending, publisher }
    }

    pub fn backlog(&self) -> &Arc<BacklogManager> {
        &self.backlog
    }

    pub fn pending(&self) -> &Arc<PendingSubscriptions> {
        &self.pending
    }

    pub fn publisher(&self) -> &PublishManager {
        &self.publisher
    }

    /// Handle a `subscribe` frame from `identity` for `channel`/`request_id`.
    ///
    /// If the job already exists and belongs to `identity`, a `sub_ack` is
    /// sent and any backlog is drained straight to the new subscriber. If
    /// the job exists but belongs to someone else, a `sub_nack` with
    /// `reason=session_mismatch` is sent and nothing is drained — the
    /// payload itself never reveals anything about the job. If the job
    /// does not exist yet, a pending `sub_ack` is
    /// sent and the attempt is parked in [`PendingSubscriptions`] for
    /// [`crate::ws::pending::PENDING_TTL`].
    pub fn subscribe(
        &self,
        identity: &SessionIdentity,
        channel: &str,
        request_id: &str,
        subscriber: WsSubscriber,
    ) {
        match self.jobs.get(request_id) {
            Some(job) if job.owner == *identity => {
                send_to(&subscriber, sub_ack(channel, request_id, false));
                let key = subscription_key(channel, request_id);
                self.registry.subscribe(&key, subscriber.clone());
                self.publisher.drain_backlog_to(&key, &subscriber);
            }
            Some(_) => {
                send_to(&subscriber, sub_nack(channel, request_id, "session_mismatch"));
            }
            None => {
                send_to(&subscriber, sub_ack(channel, request_id, true));
                self.pending.park(request_id, channel, identity.clone(), subscriber);
            }
        }
    }

    /// Call once a job is known to exist (right after `JobStore::create`) to
    /// promote any subscribe attempts that arrived first.
    pub fn resolve_pending(&self, request_id: &str, owner: &SessionIdentity) {
        for (channel, subscriber) in self.pending.take_matching(request_id, owner) {
            let key = subscription_key(&channel, request_id);
            self.registry.subscribe(&key, subscriber.clone());
            self.publisher.drain_backlog_to(&key, &subscriber);
        }
    }

    pub fn publish(&self, channel: &str, request_id: &str, payload: serde_json::Value) {
        self.publisher.publish(WsEnvelope {
            channel: channel.to_string(),
            request_id: request_id.to_string(),
            payload,
        });
    }

    pub fn disconnect(&self, socket_id: &str) {
        self.registry.remove_socket(socket_id);
    }

    /// Total active subscriptions across every channel/job, for admin and
    /// status introspection.
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }
}

fn send_to(subscriber: &WsSubscriber, envelope: WsEnvelope) {
    let _ = subscriber.sender.send(envelope);
}

fn sub_ack(channel: &str, request_id: &str, pending: bool) -> WsEnvelope {
    WsEnvelope {
        channel: channel.to_string(),
        request_id: request_id.to_string(),
        payload: serde_json::json!({"type": "sub_ack", "pending": pending}),
    }
}

fn sub_nack(channel: &str, request_id: &str, reason: &str) -> WsEnvelope {
    WsEnvelope {
        channel: channel.to_string(),
        request_id: request_id.to_string(),
        payload: serde_json::json!({"type": "sub_nack", "reason": reason}),
    }
}
