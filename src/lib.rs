//! Restaurant-search backend-for-frontend: the Route2 query pipeline,
//! assistant narration, WebSocket fan-out, and the async job lifecycle that
//! ties them together.
//!
//! Split into a library plus a thin [`main`](../src/main.rs) binary, in the
//! shape of the pack's `code-rag` example, so integration tests can drive
//! the real axum routers in-process via `tower::ServiceExt` instead of
//! spawning a subprocess.

use std::sync::Arc;

use axum::routing::{get, post};

pub mod api;
pub mod assistant;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod jobs;
pub mod language;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod places;
pub mod ranking;
pub mod region;
pub mod state;
pub mod ws;

pub use config::Config;
pub use error::AppError;
pub use state::AppState;

/// Assemble the client-facing router (port `gateway.client_port`).
///
/// `/api/v1/auth/token` and the photo proxy are mounted unauthenticated;
/// everything else behind [`api::client_auth::jwt_auth_middleware`]. The
/// WS upgrade route authenticates via ticket instead of a bearer token, so
/// it is mounted outside the JWT layer too.
pub fn build_client_app(state: Arc<AppState>) -> axum::Router {
    let public_routes = axum::Router::new()
        .route("/healthz", get(api::health::healthz))
        .route("/status", get(api::status::status))
        .route("/metrics", get(api::metrics::metrics))
        .route("/api/v1/auth/token", post(api::client::issue_token))
        .route(
            "/api/v1/photos/places/:place_id/photos/:photo_id",
            get(api::photos::get_photo),
        )
        .with_state(Arc::clone(&state));

    let authed_routes = axum::Router::new()
        .route("/api/v1/ws-ticket", post(api::client::issue_ws_ticket))
        .route("/api/v1/search", post(api::client::submit_search))
        .route("/api/v1/search/:request_id/result", get(api::client::poll_result))
        .with_state(Arc::clone(&state))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            api::client_auth::jwt_auth_middleware,
        ));

    let ws_state = Arc::new(ws::handler::WsState {
        manager: Arc::clone(&state.ws),
        ticket_store: Arc::clone(&state.ticket_store),
        subscribe_limiter: Arc::clone(&state.ws_subscribe_limiter),
    });
    let ws_route = axum::Router::new()
        .route("/ws", get(ws::handler::ws_upgrade_handler))
        .with_state(ws_state);

    let config = state.config.current();
    public_routes
        .merge(authed_routes)
        .merge(ws_route)
        .layer(axum::middleware::from_fn_with_state(
            Some(Arc::clone(&state.http_limiter)),
            api::rate_limit::rate_limit_middleware,
        ))
        .layer(build_cors_layer(&config.gateway.frontend_origins))
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
}

/// Assemble the operator-facing admin router (port `gateway.admin_port`),
/// gated by [`api::admin_auth::admin_auth_middleware`].
pub fn build_admin_app(state: Arc<AppState>) -> axum::Router {
    api::admin::router(Arc::clone(&state))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            api::admin_auth::admin_auth_middleware,
        ))
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
}

fn build_cors_layer(origins: &[String]) -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, CorsLayer};

    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(AllowOrigin::any());
    }

    let parsed: Vec<axum::http::HeaderValue> =
        origins.iter().filter_map(|o| axum::http::HeaderValue::from_str(o).ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
