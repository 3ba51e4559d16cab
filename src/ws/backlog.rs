//! Backlog for envelopes published with no live subscriber.
//!
//! Two independent caps, each with a different eviction direction:
//! - **per-key** (50 entries): the key is almost certainly still useful to
//!   its eventual subscriber, so the *oldest* entry is dropped to make room.
//! - **global** (10,000 entries): this is a blunt memory backstop across all
//!   keys; once it's hit, the incoming (*newest*) envelope is the one
//!   dropped, so one runaway key can't evict another key's backlog.
//!
//! Entries older than [`BACKLOG_TTL`] are reclaimed by [`BacklogManager::sweep_expired`],
//! mirroring [`crate::jobs::store::JobStore`]'s sweeper.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

use crate::ws::publish::WsEnvelope;

pub const PER_KEY_CAP: usize = 50;
pub const GLOBAL_CAP: usize = 10_000;
pub const BACKLOG_TTL: Duration = Duration::from_secs(120);

struct Entry {
    envelope: WsEnvelope,
    enqueued_at: Instant,
}

#[derive(Default)]
pub struct BacklogManager {
    keys: DashMap<String, VecDeque<Entry>>,
    total: AtomicUsize,
}

impl BacklogManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `envelope` under `key`, applying both caps.
    pub fn push(&self, key: String, envelope: WsEnvelope) {
        if self.total.load(Ordering::Relaxed) >= GLOBAL_CAP {
            warn!(key = %key, "global backlog cap reached, dropping newest envelope");
            return;
        }

        let mut slot = self.keys.entry(key.clone()).or_default();
        if slot.len() >= PER_KEY_CAP {
            slot.pop_front();
            self.total.fetch_sub(1, Ordering::Relaxed);
        }
        slot.push_back(Entry { envelope, enqueued_at: Instant::now() });
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return every non-expired envelope queued under `key`, in
    /// FIFO order. Expired entries are discarded, not returned.
    pub fn drain(&self, key: &str) -> Vec<WsEnvelope> {
        let Some((_, entries)) = self.keys.remove(key) else {
            return Vec::new();
        };
        let now = Instant::now();
        let mut drained = Vec::with_capacity(entries.len());
        for entry in entries {
            if now.duration_since(entry.enqueued_at) < BACKLOG_TTL {
                drained.push(entry.envelope);
            } else {
                self.total.fetch_sub(1, Ordering::Relaxed);
            }
        }
        self.total.fetch_sub(drained.len(), Ordering::Relaxed);
        drained
    }

    /// Periodic TTL sweep independent of `drain` — reclaims memory for keys
    /// that never get subscribed to.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.keys.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| now.duration_since(e.enqueued_at) < BACKLOG_TTL);
            let removed = before - entries.len();
            if removed > 0 {
                self.total.fetch_sub(removed, Ordering::Relaxed);
            }
            !entries.is_empty()
        });
    }

    pub fn total_len(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

/// Spawn the periodic sweeper as a background task.
pub fn spawn_sweeper(backlog: std::sync::Arc<BacklogManager>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            backlog.sweep_expired();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(request_id: &str) -> WsEnvelope {
        WsEnvelope {
            channel: "status".to_string(),
            request_id: request_id.to_string(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn push_then_drain_preserves_fifo_order() {
        let backlog = BacklogManager::new();
        backlog.push("k".into(), envelope("1"));
        backlog.push("k".into(), envelope("2"));
        let drained = backlog.drain("k");
        assert_eq!(drained[0].request_id, "1");
        assert_eq!(drained[1].request_id, "2");
    }

    #[test]
    fn per_key_cap_evicts_oldest() {
        let backlog = BacklogManager::new();
        for i in 0..(PER_KEY_CAP + 5) {
            backlog.push("k".into(), envelope(&i.to_string()));
        }
        let drained = backlog.drain("k");
        assert_eq!(drained.len(), PER_KEY_CAP);
        assert_eq!(drained[0].request_id, "5");
    }

    #[test]
    fn drain_on_unknown_key_returns_empty() {
        let backlog = BacklogManager::new();
        assert!(backlog.drain("missing").is_empty());
    }

    #[test]
    fn total_len_tracks_pushes_and_drains() {
        let backlog = BacklogManager::new();
        backlog.push("a".into(), envelope("1"));
        backlog.push("b".into(), envelope("2"));
        assert_eq!(backlog.total_len(), 2);
        backlog.drain("a");
        assert_eq!(backlog.total_len(), 1);
    }
}
