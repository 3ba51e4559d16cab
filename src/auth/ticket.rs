//! Single-use WebSocket tickets.
//!
//! A ticket is minted by `POST /api/v1/ws-ticket` and consumed exactly once
//! on WS handshake via GET-then-DEL semantics. The canonical backing store is
//! Redis (`ws_ticket:<id>`, TTL 30s); this is implemented behind a
//! [`TicketStore`] trait so the concrete store stays swappable, the same
//! provider-seam discipline used for [`crate::llm`]/[`crate::places`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub const TICKET_TTL: Duration = Duration::from_secs(30);

/// Ticket payload bound to a canonical session identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPayload {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("ticket missing, malformed, expired, or already used")]
    NotAuthorized,
}

/// Abstraction over the ticket backing store. Swappable for a Redis-backed
/// implementation in production; the in-memory [`InMemoryTicketStore`] below
/// is the default used when `REDIS_URL` is not configured.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn put(&self, ticket_id: &str, payload: TicketPayload);
    /// Atomic get-then-delete. Returns `None` if absent, expired, or already
    /// consumed — callers cannot distinguish these cases, which is why the WS
    /// handshake maps all of them to a single `1008 NOT_AUTHORIZED` close.
    async fn take(&self, ticket_id: &str) -> Option<TicketPayload>;
}

struct Entry {
    payload: TicketPayload,
    expires_at: Instant,
}

/// In-memory ticket store. Single-process only — acceptable since jobs and
/// sockets are already pinned to a single process here.
#[derive(Default)]
pub struct InMemoryTicketStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn put(&self, ticket_id: &str, payload: TicketPayload) {
        self.entries.insert(
            ticket_id.to_string(),
            Entry { payload, expires_at: Instant::now() + TICKET_TTL },
        );
    }

    async fn take(&self, ticket_id: &str) -> Option<TicketPayload> {
        let (_, entry) = self.entries.remove(ticket_id)?;
        if entry.expires_at < Instant::now() {
            None
        } else {
            Some(entry.payload)
        }
    }
}

/// Mint a fresh ticket for `identity` and store it, returning the opaque
/// ticket id to hand back to the client.
pub async fn mint(
    store: &Arc<dyn TicketStore>,
    identity: &crate::auth::SessionIdentity,
) -> String {
    let ticket_id = uuid::Uuid::new_v4().to_string();
    store
        .put(
            &ticket_id,
            TicketPayload {
                user_id: identity.user_id.clone(),
                session_id: identity.session_id.clone(),
                created_at: chrono::Utc::now(),
            },
        )
        .await;
    ticket_id
}

/// Consume a ticket on WS handshake, returning the bound session identity.
pub async fn consume(
    store: &Arc<dyn TicketStore>,
    ticket_id: &str,
) -> Result<crate::auth::SessionIdentity, TicketError> {
    let payload = store.take(ticket_id).await.ok_or(TicketError::NotAuthorized)?;
    Ok(crate::auth::SessionIdentity { session_id: payload.session_id, user_id: payload.user_id })
}
