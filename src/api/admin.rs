//! Admin API (admin port) — operator-facing introspection endpoints.
//!
//! These endpoints are separated onto a different port so they can be
//! network-restricted independently of the client API (e.g. accessible
//! only from the internal Docker network, never exposed to the internet).

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Build the admin-facing axum router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/admin/health", get(health))
        .route("/admin/jobs", get(jobs))
        .route("/admin/config", get(config))
        .route("/healthz", get(crate::api::health::healthz))
        .with_state(state)
}

/// `GET /admin/health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

/// `GET /admin/jobs` — in-flight and retained job counts, plus active WS
/// subscription count. No job ids, session ids, or query text — this is
/// an operator dashboard, not a debugging dump of user data.
pub async fn jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "inFlight": state.runner.in_flight_count(),
        "retained": state.jobs.len(),
        "wsSubscriptions": state.ws.subscriber_count(),
    }))
}

/// `GET /admin/config` — current config snapshot with secrets redacted:
/// env var *names* are shown, never their resolved values.
pub async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cfg = state.config.current();

    Json(json!({
        "environment": cfg.environment,
        "gateway": {
            "clientPort": cfg.gateway.client_port,
            "adminPort": cfg.gateway.admin_port,
            "logLevel": cfg.gateway.log_level,
            "rateLimitRpm": cfg.gateway.rate_limit_rpm,
            "wsSubscribeRpm": cfg.gateway.ws_subscribe_rpm,
            "frontendOrigins": cfg.gateway.frontend_origins,
            "adminTokenEnv": cfg.gateway.admin_token_env,
        },
        "jwt": { "secretEnv": cfg.jwt.secret_env },
        "ws": {
            "requireAuth": cfg.ws.require_auth,
            "redisUrlEnv": cfg.ws.redis_url_env,
        },
        "features": {
            "enableAiFeatures": cfg.features.enable_ai_features,
            "enableGoogleSearch": cfg.features.enable_google_search,
            "openaiApiKeyEnv": cfg.features.openai_api_key_env,
            "googleApiKeyEnv": cfg.features.google_api_key_env,
        },
        "llm": {
            "defaultModel": cfg.llm.default_model,
            "defaultTimeoutMs": cfg.llm.default_timeout_ms,
        },
        "googleMaps": {
            "apiKeyEnv": cfg.google_maps.api_key_env,
            "timeoutMs": cfg.google_maps.timeout_ms,
        },
    }))
}
