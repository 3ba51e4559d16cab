//! Shared fixtures for the cross-module scenario tests in `tests/`.
//!
//! Follows the same pattern `src/api/client.rs`'s own handler tests use —
//! a scripted [`LlmClient`]/[`PlacesClient`] double injected into
//! [`AppState`] — but wires a real `axum::serve` listener on an ephemeral
//! port so a genuine WebSocket upgrade can happen end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use route2_bff::llm::{LlmClient, LlmError, LlmPurpose};
use route2_bff::places::{PlacesClient, PlacesError, PlacesRequest};
use route2_bff::model::RestaurantResult;
use route2_bff::{auth::jwt::JwtCodec, auth::ticket::InMemoryTicketStore, config::Config, AppState};

/// An [`LlmClient`] whose answer for each [`LlmPurpose`] is scripted ahead
/// of time. Purposes with no scripted entry return a permissive default so
/// tests only need to override the stages they care about.
pub struct ScriptedLlm {
    responses: Mutex<HashMap<&'static str, serde_json::Value>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self { responses: Mutex::new(HashMap::new()) }
    }

    /// A fully permissive happy-path script: gate passes, intent resolves a
    /// plain text search, route mapper resolves a text search, no base
    /// filters or post-constraints.
    pub fn happy_path() -> Self {
        let llm = Self::new();
        llm.set(LlmPurpose::Gate, serde_json::json!({"decision": "CONTINUE", "confidence": 0.9, "reason": "ok"}));
        llm.set(LlmPurpose::Intent, serde_json::json!({"route": "TEXT_SEARCH", "nearMe": false}));
        llm.set(LlmPurpose::RouteMapper, serde_json::json!({"kind": "TEXT_SEARCH", "query": "pizza in tel aviv"}));
        llm.set(LlmPurpose::BaseFilters, serde_json::json!({}));
        llm.set(LlmPurpose::PostConstraints, serde_json::json!({}));
        llm.set(LlmPurpose::Assistant, serde_json::json!({"message": "Here are a few great spots."}));
        llm
    }

    pub fn set(&self, purpose: LlmPurpose, response: serde_json::Value) {
        self.responses.lock().unwrap().insert(purpose.config_prefix(), response);
    }

    fn default_for(purpose: LlmPurpose) -> serde_json::Value {
        match purpose {
            LlmPurpose::Gate => serde_json::json!({"decision": "CONTINUE", "confidence": 0.9, "reason": "ok"}),
            LlmPurpose::Intent => serde_json::json!({"route": "TEXT_SEARCH", "nearMe": false}),
            LlmPurpose::RouteMapper => serde_json::json!({"kind": "TEXT_SEARCH", "query": "food"}),
            LlmPurpose::BaseFilters => serde_json::json!({}),
            LlmPurpose::PostConstraints => serde_json::json!({}),
            LlmPurpose::Assistant => serde_json::json!({"message": "ok"}),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_json(
        &self,
        purpose: LlmPurpose,
        _model: &str,
        _prompt: &str,
        _schema: &serde_json::Value,
        _timeout: Duration,
    ) -> Result<serde_json::Value, LlmError> {
        let scripted = self.responses.lock().unwrap().get(purpose.config_prefix()).cloned();
        Ok(scripted.unwrap_or_else(|| Self::default_for(purpose)))
    }
}

/// A [`PlacesClient`] whose single outcome is fixed at construction —
/// either a result set or an error, never both across calls within one
/// test.
pub enum StubPlaces {
    Results(Vec<RestaurantResult>),
    Fails(fn() -> PlacesError),
}

#[async_trait]
impl PlacesClient for StubPlaces {
    async fn search(&self, _request: PlacesRequest, _timeout: Duration) -> Result<Vec<RestaurantResult>, PlacesError> {
        match self {
            Self::Results(results) => Ok(results.clone()),
            Self::Fails(make_err) => Err(make_err()),
        }
    }
}

pub fn sample_result(place_id: &str) -> RestaurantResult {
    use route2_bff::model::{GroupKind, LatLng};
    RestaurantResult {
        place_id: place_id.to_string(),
        name: "Good Pizza".to_string(),
        address: "1 Main St, Tel Aviv".to_string(),
        location: LatLng { lat: 32.08, lng: 34.78 },
        rating: Some(4.5),
        open_now: Some(true),
        photo_reference: Some("photo-token-abc".to_string()),
        distance_meters: None,
        score: None,
        group_kind: GroupKind::Exact,
    }
}

pub const TEST_JWT_SECRET: &str = "test-secret-at-least-32-characters-long-ok";

/// Build an [`AppState`] wired to the given provider doubles, with a fixed
/// JWT secret tests can mint tokens against directly via
/// [`AppState::jwt`]'s `issue_for`.
pub fn make_state(llm: Arc<dyn LlmClient>, places: Arc<dyn PlacesClient>) -> Arc<AppState> {
    let config = Arc::new(Config::default_for_tests());
    Arc::new(AppState::new(
        config,
        std::path::PathBuf::new(),
        JwtCodec::new(TEST_JWT_SECRET),
        Arc::new(InMemoryTicketStore::new()),
        llm,
        places,
    ))
}

/// Bind the client-facing router to an ephemeral localhost port and serve
/// it on a detached task for the lifetime of the test process. Returns the
/// bound address so callers can build `http://`/`ws://` URLs against it.
pub async fn spawn_client_app(state: Arc<AppState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = route2_bff::build_client_app(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("test server error");
    });
    addr
}

/// Issue a bearer token bound to `session_id` against `state`'s JWT codec.
pub fn token_for(state: &AppState, session_id: &str) -> String {
    state.jwt.issue_for(session_id, None).expect("issue test token")
}
