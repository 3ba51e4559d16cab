//! Closed error taxonomy for the query pipeline.
//!
//! Every error that can surface from a pipeline stage is classified into
//! exactly one [`PipelineErrorKind`] by [`classify_pipeline_error`]. This is
//! the only `errorKind`/`code` value that reaches logs, WS `error` frames,
//! and HTTP error bodies — callers never see a raw `anyhow` chain.
//!
//! A closed, `Display`-able enum (`serde(rename_all = "snake_case")`),
//! derived with `thiserror` since the enum is large enough to earn it.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of pipeline failure classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineErrorKind {
    #[error("GATE_LLM_TIMEOUT")]
    GateLlmTimeout,
    #[error("INTENT_LLM_ERROR")]
    IntentLlmError,
    #[error("GOOGLE_TIMEOUT")]
    GoogleTimeout,
    #[error("GOOGLE_QUOTA_EXCEEDED")]
    GoogleQuotaExceeded,
    #[error("DNS_FAIL")]
    DnsFail,
    #[error("NEARME_NO_LOCATION")]
    NearMeNoLocation,
    #[error("NEARME_INVALID_LOCATION")]
    NearMeInvalidLocation,
    #[error("PIPELINE_TIMEOUT")]
    PipelineTimeout,
    #[error("OPENAI_API_KEY_MISSING")]
    OpenAiApiKeyMissing,
    #[error("GOOGLE_API_KEY_MISSING")]
    GoogleApiKeyMissing,
    #[error("INTERNAL_ERROR")]
    InternalError,
    #[error("PARSE_ERROR")]
    ParseError,
    #[error("VALIDATION_ERROR")]
    ValidationError,
    #[error("PROVIDER_ERROR")]
    ProviderError,
    #[error("NETWORK_ERROR")]
    NetworkError,
    #[error("LLM_TIMEOUT")]
    LlmTimeout,
    #[error("LLM_FAILED")]
    LlmFailed,
    #[error("SCHEMA_INVALID")]
    SchemaInvalid,
    #[error("PROVIDER_UNHEALTHY")]
    ProviderUnhealthy,
}

impl PipelineErrorKind {
    /// HTTP status this kind maps to when surfaced from a handler directly.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::ValidationError
            | Self::NearMeNoLocation
            | Self::NearMeInvalidLocation => StatusCode::BAD_REQUEST,
            Self::OpenAiApiKeyMissing | Self::GoogleApiKeyMissing | Self::ProviderUnhealthy => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this stage's error has a deterministic fallback and should
    /// not abort the pipeline.
    pub fn is_stage_local(self) -> bool {
        matches!(
            self,
            Self::IntentLlmError | Self::ParseError | Self::SchemaInvalid | Self::LlmTimeout
        )
    }
}

/// Classify a raw error from an LLM call into a [`PipelineErrorKind`].
///
/// Timeouts are detected structurally (the caller passes whether the error
/// came from a `tokio::time::timeout` elapse) rather than by string-matching
/// the error message, which would be brittle across provider error shapes.
pub fn classify_llm_error(timed_out: bool, schema_invalid: bool) -> PipelineErrorKind {
    if timed_out {
        PipelineErrorKind::LlmTimeout
    } else if schema_invalid {
        PipelineErrorKind::SchemaInvalid
    } else {
        PipelineErrorKind::LlmFailed
    }
}

/// Classify a raw error from the Google-Maps style provider stage.
pub fn classify_places_error(timed_out: bool, quota_exceeded: bool) -> PipelineErrorKind {
    if timed_out {
        PipelineErrorKind::GoogleTimeout
    } else if quota_exceeded {
        PipelineErrorKind::GoogleQuotaExceeded
    } else {
        PipelineErrorKind::ProviderError
    }
}
