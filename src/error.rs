//! Unified HTTP error type for axum request handlers.
//!
//! [`AppError`] wraps an [`anyhow::Error`] together with a classified
//! [`PipelineErrorKind`] and converts both into an HTTP response via
//! [`IntoResponse`]. Handlers return `Result<T, AppError>` and propagate
//! with `?` — no manual `map_err`, no boilerplate, and never a leaked stack
//! trace: only the `tracing::warn!` log sees the full `anyhow` chain.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::pipeline::errors::PipelineErrorKind;

/// Contract version echoed on every error response and every 202 accept.
pub const CONTRACTS_VERSION: &str = "1";

/// Wraps an [`anyhow::Error`] plus its classified kind so it can be
/// returned from axum handlers and rendered as the standard
/// `{code, message, requestId, contractsVersion}` error envelope.
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
    kind: PipelineErrorKind,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(kind: PipelineErrorKind, inner: anyhow::Error) -> Self {
        Self { inner, kind, request_id: None }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PipelineErrorKind::ValidationError, anyhow::anyhow!(message.into()))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.inner, kind = %self.kind, "handler error");
        let status = self.kind.http_status();
        (
            status,
            Json(json!({
                "code": self.kind.to_string(),
                "message": self.inner.to_string(),
                "requestId": self.request_id,
                "contractsVersion": CONTRACTS_VERSION,
            })),
        )
            .into_response()
    }
}

/// Convert any `Into<anyhow::Error>` into an [`AppError`] classified as
/// `INTERNAL_ERROR`. Call sites that know a more specific kind should build
/// an [`AppError`] directly with [`AppError::new`] instead of relying on
/// this blanket conversion.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self::new(PipelineErrorKind::InternalError, e.into())
    }
}

/// `404 NOT FOUND` response shape shared by the result-polling and
/// subscribe paths. Both enforce IDOR opacity: unknown and foreign-owned
/// jobs produce byte-identical bodies.
pub fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "code": "NOT_FOUND", "message": "not found" })),
    )
        .into_response()
}
