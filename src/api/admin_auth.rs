//! Bearer-token authentication middleware for the admin API.
//!
//! When `gateway.admin_token_env` is configured, all admin routes require
//! an `Authorization: Bearer <token>` header equal to the value held in
//! that environment variable. When it is absent the middleware is a no-op
//! — admin auth is disabled, acceptable only when the admin port is
//! strictly firewalled to trusted hosts.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

pub async fn admin_auth_middleware(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let config = state.config.current();
    let Some(expected) = config.gateway.admin_token_env.as_ref().and_then(|env| std::env::var(env).ok()) else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(req).await,
        Some(_) => unauthorized("invalid admin token"),
        None => unauthorized("admin API requires Authorization: Bearer <token>"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer realm=\"route2-bff admin\"")],
        message.to_string(),
    )
        .into_response()
}
