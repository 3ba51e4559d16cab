//! Authentication: JWT issuance/verification and single-use WS tickets.

pub mod jwt;
pub mod ticket;

use serde::{Deserialize, Serialize};

/// Canonical session identity.
///
/// The `session_id` carried on a WebSocket ticket, on job creation, and on
/// subscribe must all be equal for access to succeed — this is the *only*
/// identity comparison the core trusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub session_id: String,
    pub user_id: Option<String>,
}
