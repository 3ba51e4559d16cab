//! Client-facing API (port 8080): auth token issuance, WS ticket minting,
//! and the search accept/poll surface.
//!
//! Thin handlers — all orchestration lives in [`crate::pipeline::orchestrator`]
//! and [`crate::jobs`]; this layer only translates HTTP concerns.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::SessionIdentity;
use crate::error::{not_found_response, AppError, CONTRACTS_VERSION};
use crate::jobs::store::JobState;
use crate::model::SearchRequest;
use crate::pipeline::Route2Context;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/auth/token", post(issue_token))
        .route("/api/v1/ws-ticket", post(issue_ws_ticket))
        .route("/api/v1/search", post(submit_search))
        .route("/api/v1/search/:request_id/result", get(poll_result))
        .route("/api/v1/photos/places/:place_id/photos/:photo_id", get(crate::api::photos::get_photo))
        .with_state(state)
}

#[derive(Deserialize, Default)]
pub struct AuthTokenRequest {
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct AuthTokenResponse {
    token: String,
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "traceId")]
    trace_id: String,
}

/// `POST /api/v1/auth/token`
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AuthTokenRequest>,
) -> Result<Json<AuthTokenResponse>, AppError> {
    let (token, session_id) = state.jwt.issue(body.user_id)?;
    Ok(Json(AuthTokenResponse { token, session_id, trace_id: uuid::Uuid::new_v4().to_string() }))
}

#[derive(Serialize)]
struct WsTicketResponse {
    ticket: String,
    #[serde(rename = "expiresInSeconds")]
    expires_in_seconds: u64,
}

/// `POST /api/v1/ws-ticket` — requires a verified session (JWT middleware).
pub async fn issue_ws_ticket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<SessionIdentity>,
) -> Json<WsTicketResponse> {
    let ticket = crate::auth::ticket::mint(&state.ticket_store, &identity).await;
    Json(WsTicketResponse { ticket, expires_in_seconds: crate::auth::ticket::TICKET_TTL.as_secs() })
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Serialize)]
struct SearchAcceptedResponse {
    #[serde(rename = "requestId")]
    request_id: String,
    #[serde(rename = "resultUrl")]
    result_url: String,
    #[serde(rename = "contractsVersion")]
    contracts_version: &'static str,
}

/// `POST /api/v1/search?mode=async|sync`
pub async fn submit_search(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<SessionIdentity>,
    Query(query): Query<SearchQuery>,
    Json(body): Json<SearchRequest>,
) -> Result<Response, AppError> {
    let context = Route2Context {
        query: body.query,
        user_location: body.user_location,
        locale: body.locale,
        explicit_filters: body.filters,
    };

    let request_id = state.jobs.create(identity.clone());
    state.ws.resolve_pending(&request_id, &identity);
    let config = state.config.current();
    let orchestrator = Arc::new(crate::pipeline::Route2Orchestrator::new(
        Arc::clone(&config),
        Arc::clone(&state.llm),
        Arc::clone(&state.places),
    ));
    let assistant = Arc::clone(&*state.assistant.read().await);
    let ws = Arc::clone(&state.ws);

    if query.mode.as_deref() == Some("sync") {
        let outcome =
            crate::jobs::run_search_job(orchestrator, context, request_id.clone(), ws, assistant).await;
        return match outcome {
            Ok(response) => {
                state.jobs.complete(&request_id, response.clone());
                Ok((StatusCode::OK, Json(response)).into_response())
            }
            Err((kind, message)) => {
                state.jobs.fail(&request_id, kind, message.clone());
                Err(AppError::new(kind, anyhow::anyhow!(message)).with_request_id(request_id))
            }
        };
    }

    let runner = Arc::clone(&state.runner);
    runner.spawn(request_id.clone(), async move {
        crate::jobs::run_search_job(orchestrator, context, request_id.clone(), ws, assistant).await
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(SearchAcceptedResponse {
            result_url: result_url(&request_id),
            request_id,
            contracts_version: CONTRACTS_VERSION,
        }),
    )
        .into_response())
}

fn result_url(request_id: &str) -> String {
    format!("/api/v1/search/{request_id}/result")
}

/// `GET /api/v1/search/:requestId/result`
///
/// Ownership is checked before branching on job state so an unknown id and a
/// foreign-owned id render the byte-identical `404` — no branch the caller
/// can use to tell the two apart.
pub async fn poll_result(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<SessionIdentity>,
    Path(request_id): Path<String>,
) -> Response {
    let job = match state.jobs.get(&request_id) {
        Some(job) if job.owner == identity => job,
        _ => return not_found_response(),
    };

    match job.state {
        JobState::Pending => (StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))).into_response(),
        JobState::Done { response } => (StatusCode::OK, Json(response)).into_response(),
        JobState::Failed { kind, message } => (
            kind.http_status(),
            Json(json!({
                "code": kind.to_string(),
                "message": message,
                "requestId": request_id,
                "contractsVersion": CONTRACTS_VERSION,
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtCodec;
    use crate::llm::{LlmClient, LlmError, LlmPurpose};
    use crate::places::{PlacesClient, PlacesError, PlacesRequest};
    use crate::model::RestaurantResult;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubLlm;
    #[async_trait::async_trait]
    impl LlmClient for StubLlm {
        async fn complete_json(
            &self,
            _purpose: LlmPurpose,
            _model: &str,
            _prompt: &str,
            _schema: &serde_json::Value,
            _timeout: Duration,
        ) -> Result<serde_json::Value, LlmError> {
            Ok(json!({"decision": "STOP", "confidence": 0.1, "reason": "not_restaurant_search"}))
        }
    }

    struct StubPlaces;
    #[async_trait::async_trait]
    impl PlacesClient for StubPlaces {
        async fn search(
            &self,
            _request: PlacesRequest,
            _timeout: Duration,
        ) -> Result<Vec<RestaurantResult>, PlacesError> {
            Ok(Vec::new())
        }
    }

    fn state() -> Arc<AppState> {
        let config = Arc::new(crate::config::Config::default_for_tests());
        Arc::new(AppState::new(
            config,
            std::path::PathBuf::new(),
            JwtCodec::new("test-secret-at-least-32-characters-long"),
            Arc::new(crate::auth::ticket::InMemoryTicketStore::new()),
            Arc::new(StubLlm),
            Arc::new(StubPlaces),
        ))
    }

    fn identity() -> SessionIdentity {
        SessionIdentity { session_id: "sess-client-test".into(), user_id: None }
    }

    #[tokio::test]
    async fn issue_token_returns_distinct_session_ids() {
        let state = state();
        let resp_a = issue_token(State(state.clone()), Json(AuthTokenRequest::default())).await.unwrap();
        let resp_b = issue_token(State(state), Json(AuthTokenRequest::default())).await.unwrap();
        assert_ne!(resp_a.session_id, resp_b.session_id);
    }

    #[tokio::test]
    async fn ws_ticket_round_trips_through_store() {
        let state = state();
        let resp = issue_ws_ticket(State(state.clone()), Extension(identity())).await;
        let resolved = crate::auth::ticket::consume(&state.ticket_store, &resp.ticket).await.unwrap();
        assert_eq!(resolved.session_id, identity().session_id);
    }

    #[tokio::test]
    async fn sync_search_with_gate_stop_returns_empty_results() {
        let state = state();
        let query = SearchQuery { mode: Some("sync".into()) };
        let body = SearchRequest { query: "asdf".into(), user_location: None, locale: None, filters: None, clear_context: None };
        let resp = submit_search(State(state), Extension(identity()), Query(query), Json(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn async_search_accepts_with_result_url() {
        let state = state();
        let query = SearchQuery { mode: None };
        let body = SearchRequest { query: "sushi".into(), user_location: None, locale: None, filters: None, clear_context: None };
        let resp = submit_search(State(state), Extension(identity()), Query(query), Json(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn poll_result_for_unknown_job_is_not_found() {
        let state = state();
        let resp = poll_result(State(state), Extension(identity()), Path("never-created".into())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn poll_result_for_foreign_session_is_not_found() {
        let state = state();
        let request_id = state.jobs.create(identity());
        let other = SessionIdentity { session_id: "someone-else".into(), user_id: None };
        let resp = poll_result(State(state), Extension(other), Path(request_id)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn poll_result_for_pending_job_returns_accepted() {
        let state = state();
        let request_id = state.jobs.create(identity());
        let resp = poll_result(State(state), Extension(identity()), Path(request_id)).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn poll_result_router_mounts_expected_paths() {
        let state = state();
        let app = router(state.clone()).layer(Extension(identity()));
        let resp = app
            .oneshot(
                HttpRequest::post("/api/v1/auth/token")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 4096).await.unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&body).unwrap().get("token").is_some());
    }
}
