//! Resolves the subscribe-before-job-exists race.
//!
//! A client can send `subscribe` for a `requestId` the server hasn't
//! created a [`crate::jobs::store::Job`] for yet — the HTTP accept response
//! and the WS subscribe frame travel independently and can arrive in either
//! order. Rather than rejecting the subscribe outright, it is parked here
//! until [`crate::ws::manager::WebSocketManager::resolve_pending`] is called
//! once the job is known to exist, at which point it is promoted into the
//! real [`crate::ws::subscription::SubscriptionRegistry`] if the caller's
//! identity matches the job's owner.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::auth::SessionIdentity;
use crate::ws::subscription::WsSubscriber;

/// How long a subscribe attempt waits for its job to show up.
pub const PENDING_TTL: Duration = Duration::from_secs(30);

struct PendingEntry {
    channel: String,
    identity: SessionIdentity,
    subscriber: WsSubscriber,
    parked_at: Instant,
}

#[derive(Default)]
pub struct PendingSubscriptions {
    by_request_id: DashMap<String, Vec<PendingEntry>>,
}

impl PendingSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a subscribe attempt for `request_id` under `channel`.
    pub fn park(
        &self,
        request_id: &str,
        channel: &str,
        identity: SessionIdentity,
        subscriber: WsSubscriber,
    ) {
        self.by_request_id.entry(request_id.to_string()).or_default().push(PendingEntry {
            channel: channel.to_string(),
            identity,
            subscriber,
            parked_at: Instant::now(),
        });
    }

    /// Take every non-expired parked entry for `request_id` whose identity
    /// matches `owner`, dropping entries that belong to a different session
    /// entirely (they will never resolve — IDOR-opacity rule
    /// applies here too: a foreign session simply never gets promoted).
    pub fn take_matching(&self, request_id: &str, owner: &SessionIdentity) -> Vec<(String, WsSubscriber)> {
        let Some((_, entries)) = self.by_request_id.remove(request_id) else {
            return Vec::new();
        };
        let now = Instant::now();
        entries
            .into_iter()
            .filter(|e| now.duration_since(e.parked_at) < PENDING_TTL)
            .filter(|e| &e.identity == owner)
            .map(|e| (e.channel, e.subscriber))
            .collect()
    }

    /// Periodic sweep of entries that outlived [`PENDING_TTL`] without ever
    /// being resolved (the job never materialized, or materialized too
    /// late).
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.by_request_id.retain(|_, entries| {
            entries.retain(|e| now.duration_since(e.parked_at) < PENDING_TTL);
            !entries.is_empty()
        });
    }
}
