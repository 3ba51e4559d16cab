//! Public status endpoint (`GET /status`, client port).
//!
//! Safe to expose publicly without authentication. Returns gateway
//! liveness and aggregate counters only — no job ids, no session ids, no
//! query text, nothing that identifies a particular user or request.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /status` — public liveness and aggregate-metrics endpoint.
///
/// Example response:
/// ```json
/// {
///   "status": "ok",
///   "ready": true,
///   "uptimeSecs": 3600,
///   "jobs": { "inFlight": 2, "retained": 14 },
///   "wsSubscriptions": 5
/// }
/// ```
///
/// `ready` is `false` when AI features are enabled but the configured
/// OpenAI API key environment variable is unset or empty — the boolean is
/// exposed, never the env var name or its value.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();
    let config = state.config.current();

    let ready = !config.features.enable_ai_features
        || config
            .features
            .openai_api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .is_some_and(|key| !key.is_empty());

    Json(json!({
        "status": "ok",
        "ready": ready,
        "uptimeSecs": uptime_secs,
        "jobs": {
            "inFlight": state.runner.in_flight_count(),
            "retained": state.jobs.len(),
        },
        "wsSubscriptions": state.ws.subscriber_count(),
    }))
}
