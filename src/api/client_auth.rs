//! JWT Bearer authentication middleware for the client API.
//!
//! Every route under `/api/v1` except `/api/v1/auth/token` and the public
//! photo proxy requires a valid `Authorization: Bearer <jwt>` header. On
//! success the verified [`crate::auth::SessionIdentity`] is injected as a
//! request extension — handlers read it directly rather than re-verifying
//! the token: one middleware resolves identity once, handlers trust it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::SessionIdentity;
use crate::state::AppState;

pub async fn jwt_auth_middleware(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = provided else {
        return unauthorized("Authorization: Bearer <token> required");
    };

    match state.jwt.verify(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims.identity());
            next.run(req).await
        }
        Err(_) => unauthorized("invalid or expired token"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        message.to_string(),
    )
        .into_response()
}

/// Extractor-friendly accessor: every handler behind [`jwt_auth_middleware`]
/// can take `Extension<SessionIdentity>` directly; this helper exists only
/// for call sites that already hold a `Request`/`Parts`.
pub fn identity_of(req: &Request) -> Option<SessionIdentity> {
    req.extensions().get::<SessionIdentity>().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtCodec;
    use axum::{
        body::{to_bytes, Body},
        http::Request as HttpRequest,
        middleware,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let config = Arc::new(crate::config::Config::default_for_tests());
        Arc::new(AppState::new(
            config.clone(),
            std::path::PathBuf::new(),
            JwtCodec::new("test-secret-at-least-32-characters-long"),
            Arc::new(crate::auth::ticket::InMemoryTicketStore::new()),
            Arc::new(NullLlm),
            Arc::new(NullPlaces),
        ))
    }

    struct NullLlm;
    #[async_trait::async_trait]
    impl crate::llm::LlmClient for NullLlm {
        async fn complete_json(
            &self,
            _: crate::llm::LlmPurpose,
            _: &str,
            _: &str,
            _: &serde_json::Value,
            _: std::time::Duration,
        ) -> Result<serde_json::Value, crate::llm::LlmError> {
            unimplemented!()
        }
    }

    struct NullPlaces;
    #[async_trait::async_trait]
    impl crate::places::PlacesClient for NullPlaces {
        async fn search(
            &self,
            _: crate::places::PlacesRequest,
            _: std::time::Duration,
        ) -> Result<Vec<crate::model::RestaurantResult>, crate::places::PlacesError> {
            unimplemented!()
        }
    }

    async fn echo_session(Extension(identity): Extension<SessionIdentity>) -> String {
        identity.session_id
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(echo_session))
            .layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware))
            .with_state(state)
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let resp = app(state()).oneshot(HttpRequest::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_injects_session_identity() {
        let state = state();
        let token = state.jwt.issue_for("sess-42", None).unwrap();
        let resp = app(state)
            .oneshot(HttpRequest::get("/").header("authorization", format!("Bearer {token}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 256).await.unwrap();
        assert_eq!(&body[..], b"sess-42");
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let state = state();
        let mut token = state.jwt.issue_for("sess-42", None).unwrap();
        token.push('x');
        let resp = app(state)
            .oneshot(HttpRequest::get("/").header("authorization", format!("Bearer {token}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
