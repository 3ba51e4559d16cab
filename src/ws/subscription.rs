//! Subscriber bookkeeping for the WebSocket fan-out layer.
//!
//! A subscription is keyed by the canonical string `"{channel}:{requestId}"`
//! so a single socket can hold many independent subscriptions without the
//! registry needing to know anything about channel semantics.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::ws::publish::WsEnvelope;

/// Build the canonical registry key for a channel/request pair.
pub fn subscription_key(channel: &str, request_id: &str) -> String {
    format!("{channel}:{request_id}")
}

/// One socket's interest in a subscription key. Cloneable — cheap, since the
/// sender is an `mpsc::UnboundedSender` clone.
#[derive(Clone)]
pub struct WsSubscriber {
    pub socket_id: String,
    pub sender: mpsc::UnboundedSender<WsEnvelope>,
}

/// Registry of subscribers per canonical key.
///
/// Snapshot-before-iterate discipline: callers that need to publish clone the
/// `Vec<WsSubscriber>` out from under the `DashMap` entry's lock and then
/// iterate the clone, so a subscriber disconnecting mid-publish can't
/// deadlock or panic the publish loop — the same `Arc::clone`-out-from-under-
/// a-held-lock discipline used for the live config snapshot.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: DashMap<String, Vec<WsSubscriber>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, key: &str, subscriber: WsSubscriber) {
        self.subscribers.entry(key.to_string()).or_default().push(subscriber);
    }

    /// Remove every subscription belonging to `socket_id`, across all keys.
    /// Called once on socket teardown.
    pub fn remove_socket(&self, socket_id: &str) {
        self.subscribers.retain(|_, subs| {
            subs.retain(|s| s.socket_id != socket_id);
            !subs.is_empty()
        });
    }

    /// Snapshot of current subscribers for `key`, or an empty vec if none.
    pub fn snapshot(&self, key: &str) -> Vec<WsSubscriber> {
        self.subscribers.get(key).map(|e| e.clone()).unwrap_or_default()
    }

    pub fn has_subscribers(&self, key: &str) -> bool {
        self.subscribers.get(key).map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Total subscriber entries across every key, for admin/status
    /// introspection. Counts one per (socket, key) pair, so a socket
    /// holding three subscriptions counts as three.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().map(|e| e.value().len()).sum()
    }
}

pub type SharedRegistry = Arc<SubscriptionRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(socket_id: &str) -> (WsSubscriber, mpsc::UnboundedReceiver<WsEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WsSubscriber { socket_id: socket_id.to_string(), sender: tx }, rx)
    }

    #[test]
    fn subscription_key_is_channel_colon_request_id() {
        assert_eq!(subscription_key("status", "req-1"), "status:req-1");
    }

    #[test]
    fn subscribe_then_snapshot_returns_subscriber() {
        let registry = SubscriptionRegistry::new();
        let (sub, _rx) = subscriber("sock-1");
        registry.subscribe("status:req-1", sub);
        assert_eq!(registry.snapshot("status:req-1").len(), 1);
        assert!(registry.has_subscribers("status:req-1"));
    }

    #[test]
    fn remove_socket_clears_all_its_keys() {
        let registry = SubscriptionRegistry::new();
        let (sub_a, _rx_a) = subscriber("sock-1");
        let (sub_b, _rx_b) = subscriber("sock-1");
        registry.subscribe("status:req-1", sub_a);
        registry.subscribe("summary:req-1", sub_b);
        registry.remove_socket("sock-1");
        assert!(!registry.has_subscribers("status:req-1"));
        assert!(!registry.has_subscribers("summary:req-1"));
    }

    #[test]
    fn remove_socket_leaves_other_sockets_subscribed() {
        let registry = SubscriptionRegistry::new();
        let (sub_a, _rx_a) = subscriber("sock-1");
        let (sub_b, _rx_b) = subscriber("sock-2");
        registry.subscribe("status:req-1", sub_a);
        registry.subscribe("status:req-1", sub_b);
        registry.remove_socket("sock-1");
        assert_eq!(registry.snapshot("status:req-1").len(), 1);
    }
}
