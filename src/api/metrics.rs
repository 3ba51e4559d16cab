//! Prometheus-compatible `/metrics` endpoint.
//!
//! All gauges are point-in-time reads of the job store, the async runner,
//! and the WebSocket subscription registry — there is no ring-buffer window
//! here, just the always-current job/connection state.
//!
//! Metric families:
//! - `route2_jobs_in_flight`      — jobs currently executing on the runner
//! - `route2_jobs_retained`       — terminal jobs still held for polling
//! - `route2_ws_subscriptions`    — active WebSocket subscriptions

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::state::AppState;

/// `GET /metrics` — renders Prometheus text format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut out = String::with_capacity(512);

    out.push_str("# HELP route2_jobs_in_flight Jobs currently executing on the async runner.\n");
    out.push_str("# TYPE route2_jobs_in_flight gauge\n");
    out.push_str(&format!("route2_jobs_in_flight {}\n\n", state.runner.in_flight_count()));

    out.push_str("# HELP route2_jobs_retained Terminal jobs still held for result polling.\n");
    out.push_str("# TYPE route2_jobs_retained gauge\n");
    out.push_str(&format!("route2_jobs_retained {}\n\n", state.jobs.len()));

    out.push_str("# HELP route2_ws_subscriptions Active WebSocket subscriptions across all channels.\n");
    out.push_str("# TYPE route2_ws_subscriptions gauge\n");
    out.push_str(&format!("route2_ws_subscriptions {}\n", state.ws.subscriber_count()));

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], out)
}
