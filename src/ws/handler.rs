//! Axum WebSocket upgrade handler.
//!
//! Grounded on the connection-lifecycle shape of
//! `examples/other_examples/82c61572_jtjenkins-Together__server-src-websocket-handler.rs.rs`:
//! authenticate before upgrading, split the socket into independent send/
//! receive tasks, and tear both down with `tokio::select!` the moment either
//! finishes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::rate_limit::RateLimiter;
use crate::auth::SessionIdentity;
use crate::ws::manager::WebSocketManager;
use crate::ws::subscription::WsSubscriber;

#[derive(Deserialize)]
pub struct WsQuery {
    ticket: String,
}

/// Inbound client frame. clients historically sent a flatter
/// `{channel, requestId}` shape for subscribe before the `type` envelope was
/// introduced; both are accepted (`normalize` below).
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame {
    Subscribe { channel: String, #[serde(rename = "requestId")] request_id: String },
    Unsubscribe { channel: String, #[serde(rename = "requestId")] request_id: String },
}

#[derive(Deserialize)]
struct LegacySubscribeFrame {
    channel: String,
    #[serde(rename = "requestId")]
    request_id: String,
}

fn parse_client_frame(text: &str) -> Option<ClientFrame> {
    if let Ok(frame) = serde_json::from_str::<ClientFrame>(text) {
        return Some(frame);
    }
    // Legacy shape: no `type` tag, subscribe-only.
    serde_json::from_str::<LegacySubscribeFrame>(text)
        .ok()
        .map(|f| ClientFrame::Subscribe { channel: f.channel, request_id: f.request_id })
}

pub struct WsState {
    pub manager: Arc<WebSocketManager>,
    pub ticket_store: Arc<dyn crate::auth::ticket::TicketStore>,
    pub subscribe_limiter: Arc<RateLimiter<String>>,
}

pub async fn ws_upgrade_handler(
    State(state): State<Arc<WsState>>,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    // Invalid, expired, and already-consumed tickets are indistinguishable
    // from the client's point of view: a plain 401 before the upgrade.
    let identity = match crate::auth::ticket::consume(&state.ticket_store, &query.ticket).await {
        Ok(identity) => identity,
        Err(_) => {
            return Response::builder()
                .status(axum::http::StatusCode::UNAUTHORIZED)
                .body(axum::body::Body::empty())
                .unwrap();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, addr))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<WsState>,
    identity: SessionIdentity,
    addr: SocketAddr,
) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    info!(socket_id = %socket_id, session_id = %identity.session_id, peer = %addr, "ws connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<crate::ws::publish::WsEnvelope>();

    let mut send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let manager = Arc::clone(&state.manager);
    let limiter = Arc::clone(&state.subscribe_limiter);
    let recv_identity = identity.clone();
    let recv_socket_id = socket_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            let Message::Text(text) = message else { continue };
            let Some(frame) = parse_client_frame(&text) else {
                warn!(socket_id = %recv_socket_id, "ignoring unparseable ws frame");
                continue;
            };
            match frame {
                ClientFrame::Subscribe { channel, request_id } => {
                    if !limiter.allow(&recv_socket_id) {
                        warn!(socket_id = %recv_socket_id, "subscribe rate limited");
                        continue;
                    }
                    let subscriber =
                        WsSubscriber { socket_id: recv_socket_id.clone(), sender: tx.clone() };
                    manager.subscribe(&recv_identity, &channel, &request_id, subscriber);
                }
                ClientFrame::Unsubscribe { .. } => {
                    // Per-key unsubscribe is not modeled separately from
                    // socket teardown; accepted and
                    // ignored so clients that send it don't get an error.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.manager.disconnect(&socket_id);
    info!(socket_id = %socket_id, "ws disconnected");
}
